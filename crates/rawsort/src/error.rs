use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RawsortError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Organize error: {0}")]
    Organize(#[from] OrganizeError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid category rule '{name}': {reason}")]
    InvalidRule { name: String, reason: String },
}

/// Per-file extraction failures. These are recorded against the file and the
/// file is excluded from the record set; they never abort a run.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Metadata extraction timed out after {timeout_secs}s for '{path}'")]
    Timeout { path: PathBuf, timeout_secs: u64 },

    #[error("Metadata tool failed: {0}")]
    ToolFailure(String),

    #[error("Failed to parse metadata tool output: {0}")]
    ParseFailure(String),
}

/// Cache failures degrade to a cache miss inside the store boundary; they are
/// surfaced only so callers can log them.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to create cache directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open metadata cache '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Cache read failed: {0}")]
    Read(rusqlite::Error),

    #[error("Cache write failed: {0}")]
    Write(rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

#[derive(Error, Debug)]
pub enum OrganizeError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to transfer file from '{from}' to '{to}': {source}")]
    TransferFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Target already exists: {0}")]
    TargetExists(PathBuf),
}

pub type Result<T> = std::result::Result<T, RawsortError>;
