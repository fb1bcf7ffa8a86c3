//! Run orchestration: extraction, scoring, burst promotion, suggestion
//! overrides, and the run summary.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::burst::{self, BurstGroup};
use crate::cache::MetadataCache;
use crate::categorizer::Scorer;
use crate::config::schema::BurstConfig;
use crate::config::Config;
use crate::extractor::{ExiftoolReader, MetadataReader};
use crate::metadata::PhotoRecord;
use crate::pipeline::{ExtractionPipeline, ProgressMarker};
use crate::suggest::{should_override, CategorySuggester, NoopSuggester};

const FAILURE_SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Idle,
    Extracting,
    Scoring,
    BurstDetecting,
    Promoting,
    Done,
}

impl RunPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunPhase::Extracting,
            2 => RunPhase::Scoring,
            3 => RunPhase::BurstDetecting,
            4 => RunPhase::Promoting,
            5 => RunPhase::Done,
            _ => RunPhase::Idle,
        }
    }
}

/// Machine-readable account of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_files: usize,
    pub extracted: usize,
    /// Paths settled from the progress marker without re-extraction.
    pub resumed: usize,
    pub failed: usize,
    /// Up to ten failure descriptions, for reporting without unbounded size.
    pub failure_samples: Vec<String>,
    pub category_counts: BTreeMap<String, usize>,
    pub burst_groups: usize,
    pub burst_members: usize,
    /// Records whose folder-derived prior category disagrees with the final
    /// assignment.
    pub prior_mismatches: usize,
}

pub struct Orchestrator {
    pipeline: ExtractionPipeline,
    scorer: Scorer,
    burst: BurstConfig,
    suggester: Box<dyn CategorySuggester>,
    phase: AtomicU8,
}

impl Orchestrator {
    pub fn new(pipeline: ExtractionPipeline, scorer: Scorer, burst: BurstConfig) -> Self {
        Self {
            pipeline,
            scorer,
            burst,
            suggester: Box::new(NoopSuggester),
            phase: AtomicU8::new(RunPhase::Idle as u8),
        }
    }

    /// Wires a validated configuration onto the runtime pieces: exiftool
    /// timeouts, the cache at `cache_dir` when enabled, pool size, batch
    /// size, the scoring rules with their threshold, and burst settings.
    pub fn from_config(config: &Config) -> Self {
        let reader = Arc::new(ExiftoolReader::new(
            config.extract_timeout_secs,
            config.batch_timeout_secs,
        ));
        Self::from_config_with_reader(config, reader)
    }

    /// Same wiring with a caller-supplied reader, for in-process metadata
    /// libraries and tests.
    pub fn from_config_with_reader(config: &Config, reader: Arc<dyn MetadataReader>) -> Self {
        let cache = if config.cache_enabled {
            match MetadataCache::open(&config.cache_dir) {
                Ok(cache) => Some(Arc::new(cache)),
                Err(e) => {
                    warn!("Metadata cache unavailable, running uncached: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let pipeline =
            ExtractionPipeline::new(reader, cache, config.max_workers, config.batch_size);
        let scorer = Scorer::new(config.categories.clone(), config.confidence_threshold);

        Self::new(pipeline, scorer, config.burst.clone())
    }

    /// Progress marker at the configured path, when resume is enabled.
    pub fn progress_marker(config: &Config) -> Option<ProgressMarker> {
        config.progress_file.as_ref().map(ProgressMarker::load)
    }

    pub fn with_suggester(mut self, suggester: Box<dyn CategorySuggester>) -> Self {
        self.suggester = suggester;
        self
    }

    /// Current phase, observable from other threads during a run.
    pub fn phase(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::Relaxed))
    }

    fn set_phase(&self, phase: RunPhase) {
        debug!("Run phase: {:?}", phase);
        self.phase.store(phase as u8, Ordering::Relaxed);
    }

    /// Runs the full pass over `paths`: extraction settles completely, then
    /// scoring, burst detection, promotion, and suggestion overrides run
    /// over the settled record set.
    pub fn run(
        &self,
        paths: &[PathBuf],
        marker: Option<&mut ProgressMarker>,
    ) -> (Vec<PhotoRecord>, RunSummary) {
        self.set_phase(RunPhase::Extracting);
        let mut outcome = self.pipeline.run(paths, marker);
        let mut records = std::mem::take(&mut outcome.records);

        self.set_phase(RunPhase::Scoring);
        for record in &mut records {
            record.assigned_category = self.scorer.classify(record);
        }

        self.set_phase(RunPhase::BurstDetecting);
        let groups = self.detect_groups(&records);

        self.set_phase(RunPhase::Promoting);
        burst::promote(&mut records, &groups);
        self.apply_suggestions(&mut records);

        let summary = self.summarize(paths.len(), &records, &outcome, &groups);
        self.set_phase(RunPhase::Done);

        info!(
            "Run complete: {} of {} file(s) classified, {} burst group(s)",
            summary.extracted, summary.total_files, summary.burst_groups
        );
        (records, summary)
    }

    /// Timestamp detection when any record carries a capture timestamp.
    /// Only a wholly timestamp-free set falls back to filename sequence
    /// numbers.
    #[allow(deprecated)]
    fn detect_groups(&self, records: &[PhotoRecord]) -> Vec<BurstGroup> {
        if records.iter().any(|r| r.capture_timestamp > 0.0) {
            return burst::detect(records, self.burst.window_secs, self.burst.min_len);
        }

        debug!("No capture timestamps in record set, using sequence fallback");
        burst::detect_by_sequence(
            records,
            self.burst.sequence_gap,
            self.burst.sequence_window_secs,
            self.burst.min_len,
        )
    }

    fn apply_suggestions(&self, records: &mut [PhotoRecord]) {
        for record in records {
            let Some(suggestion) = self.suggester.suggest(record) else {
                continue;
            };
            if should_override(&record.assigned_category, &suggestion) {
                debug!(
                    "Suggestion override for '{}': {} -> {} (confidence {})",
                    record.file_path.display(),
                    record.assigned_category,
                    suggestion.category,
                    suggestion.confidence
                );
                record.assigned_category = suggestion.category;
            }
        }
    }

    fn summarize(
        &self,
        total_files: usize,
        records: &[PhotoRecord],
        outcome: &crate::pipeline::ExtractionOutcome,
        groups: &[BurstGroup],
    ) -> RunSummary {
        let mut category_counts = BTreeMap::new();
        let mut prior_mismatches = 0;

        for record in records {
            *category_counts
                .entry(record.assigned_category.clone())
                .or_insert(0) += 1;

            if record
                .prior_category
                .as_ref()
                .is_some_and(|prior| prior != &record.assigned_category)
            {
                prior_mismatches += 1;
            }
        }

        let failure_samples = outcome
            .failures
            .iter()
            .take(FAILURE_SAMPLE_LIMIT)
            .map(|(path, e)| format!("{}: {}", path.display(), e))
            .collect();

        RunSummary {
            total_files,
            extracted: records.len(),
            resumed: outcome.resumed,
            failed: outcome.failures.len(),
            failure_samples,
            category_counts,
            burst_groups: groups.len(),
            burst_members: groups.iter().map(BurstGroup::len).sum(),
            prior_mismatches,
        }
    }
}
