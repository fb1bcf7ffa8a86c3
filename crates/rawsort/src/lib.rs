pub mod burst;
pub mod cache;
pub mod categorizer;
pub mod config;
pub mod error;
pub mod extractor;
pub mod metadata;
pub mod orchestrator;
pub mod organizer;
pub mod pipeline;
pub mod suggest;
pub mod worker;

pub use burst::{BurstGroup, detect as detect_bursts, promote as promote_bursts};
pub use cache::MetadataCache;
pub use categorizer::Scorer;
pub use config::{load_config, BurstConfig, CategoryRule, Config};
pub use error::{
    CacheError, ConfigError, ExtractError, OrganizeError, RawsortError, Result, WorkerError,
};
pub use extractor::{ExiftoolReader, MetadataReader};
pub use metadata::PhotoRecord;
pub use orchestrator::{Orchestrator, RunPhase, RunSummary};
pub use organizer::{OrganizePlan, OrganizeReport, Organizer, TransferMode};
pub use pipeline::{ExtractionPipeline, ProgressMarker};
pub use suggest::{CategorySuggester, NoopSuggester, Suggestion};
pub use worker::{Job, JobResult, PhotoScanner, WorkerPool};
