use std::path::{Path, PathBuf};

use log::{info, warn};
use walkdir::WalkDir;

use crate::error::WorkerError;

/// Raw camera formats.
pub const RAW_EXTENSIONS: &[&str] = &[
    "arw", "cr2", "nef", "raf", "orf", "rw2", "pef", "srw", "dng", "raw",
];

/// Processed image formats, scanned alongside raws.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif", "bmp", "gif"];

pub struct PhotoScanner {
    root: PathBuf,
    include_images: bool,
}

impl PhotoScanner {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            include_images: true,
        }
    }

    /// Restricts the scan to raw camera formats only.
    pub fn raw_only(mut self) -> Self {
        self.include_images = false;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Recursively collects supported photo files under the root, sorted by
    /// path for deterministic processing order. Unreadable subtrees are
    /// skipped with a warning; an unreadable root is fatal.
    pub fn scan(&self) -> Result<Vec<PathBuf>, WorkerError> {
        let mut paths = Vec::new();

        for entry in WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if e.depth() == 0 {
                        return Err(WorkerError::ScanFailed {
                            path: self.root.clone(),
                            source: e,
                        });
                    }
                    warn!("Skipping unreadable entry under '{}': {}", self.root.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            if path.is_dir() {
                continue;
            }

            if self.is_supported(path) {
                paths.push(path.to_path_buf());
            }
        }

        paths.sort();
        info!("Scanned {} photo(s) in {}", paths.len(), self.root.display());
        Ok(paths)
    }

    fn is_supported(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_lowercase();

        RAW_EXTENSIONS.contains(&ext.as_str())
            || (self.include_images && IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }
}
