//! Resume marker: a JSON array of already-processed path strings.
//!
//! A path is recorded once its outcome is terminal, whether that outcome is
//! a record or a failure. The marker has a single writer (the pipeline
//! thread) and is flushed periodically so a killed run loses at most one
//! flush interval of progress.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{debug, warn};

const FLUSH_INTERVAL: usize = 100;

pub struct ProgressMarker {
    file_path: PathBuf,
    processed: BTreeSet<String>,
    unflushed: usize,
}

impl ProgressMarker {
    /// Loads the marker file. A missing file starts an empty marker; a
    /// corrupt one is discarded with a warning rather than blocking the run.
    pub fn load<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();

        let processed = match std::fs::read_to_string(&file_path) {
            Ok(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(paths) => paths.into_iter().collect(),
                Err(e) => {
                    warn!(
                        "Corrupt progress marker '{}', starting fresh: {}",
                        file_path.display(),
                        e
                    );
                    BTreeSet::new()
                }
            },
            Err(_) => BTreeSet::new(),
        };

        debug!(
            "Loaded progress marker '{}' with {} entries",
            file_path.display(),
            processed.len()
        );

        Self {
            file_path,
            processed,
            unflushed: 0,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.processed.contains(&path.to_string_lossy().into_owned())
    }

    /// Records a terminal outcome for a path, flushing every
    /// `FLUSH_INTERVAL` new entries.
    pub fn record(&mut self, path: &Path) {
        if self.processed.insert(path.to_string_lossy().into_owned()) {
            self.unflushed += 1;
            if self.unflushed >= FLUSH_INTERVAL {
                self.flush();
            }
        }
    }

    /// Writes the marker to disk. Failures are logged, never fatal.
    pub fn flush(&mut self) {
        let paths: Vec<&String> = self.processed.iter().collect();
        match serde_json::to_string(&paths) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.file_path, json) {
                    warn!(
                        "Failed to write progress marker '{}': {}",
                        self.file_path.display(),
                        e
                    );
                } else {
                    self.unflushed = 0;
                }
            }
            Err(e) => warn!("Failed to encode progress marker: {}", e),
        }
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}

impl Drop for ProgressMarker {
    fn drop(&mut self) {
        if self.unflushed > 0 {
            self.flush();
        }
    }
}
