use std::path::PathBuf;

use crate::error::ExtractError;
use crate::metadata::PhotoRecord;

/// Unit of work for the extraction pool.
#[derive(Debug, Clone)]
pub enum Job {
    /// One file, resolved cache-first.
    Single(PathBuf),
    /// Several files in one tool invocation. Used when the cache is disabled
    /// and per-file resolution would waste tool startup time.
    Batch(Vec<PathBuf>),
}

impl Job {
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            Job::Single(path) => std::slice::from_ref(path),
            Job::Batch(paths) => paths,
        }
    }

    pub fn len(&self) -> usize {
        self.paths().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths().is_empty()
    }
}

/// Per-path outcomes for one job. Every input path of the job appears exactly
/// once, either with a record or with its terminal failure.
#[derive(Debug)]
pub struct JobResult {
    pub outcomes: Vec<(PathBuf, Result<PhotoRecord, ExtractError>)>,
}

impl JobResult {
    pub fn successes(&self) -> impl Iterator<Item = (&PathBuf, &PhotoRecord)> {
        self.outcomes
            .iter()
            .filter_map(|(path, outcome)| outcome.as_ref().ok().map(|r| (path, r)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &ExtractError)> {
        self.outcomes
            .iter()
            .filter_map(|(path, outcome)| outcome.as_ref().err().map(|e| (path, e)))
    }
}
