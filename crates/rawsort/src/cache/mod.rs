//! Persistent metadata cache keyed by file path, invalidated by source file
//! modification time.
//!
//! Every read and write failure degrades to a cache miss; caching is never
//! fatal to a run.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::CacheError;
use crate::metadata::PhotoRecord;

pub struct MetadataCache {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl MetadataCache {
    /// Opens (or creates) the cache database at `dir/metadata_cache.db`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, CacheError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| CacheError::CreateDir {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let db_path = dir.join("metadata_cache.db");
        let conn = Connection::open(&db_path).map_err(|e| CacheError::Open {
            path: db_path.clone(),
            source: e,
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS exif_cache (
                file_path       TEXT PRIMARY KEY,
                modified_time   INTEGER NOT NULL,
                cached_at       INTEGER NOT NULL,
                record_json     TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| CacheError::Open {
            path: db_path.clone(),
            source: e,
        })?;

        debug!("Metadata cache opened at {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Returns the cached record for `path`, or `None` when no entry exists,
    /// the entry predates the file's current modification time, or any
    /// read/decode error occurs. Conservative: prefer re-extraction over
    /// serving a record for a file that may have changed.
    pub fn get(&self, path: &Path, current_modified_time: i64) -> Option<PhotoRecord> {
        match self.try_get(path, current_modified_time) {
            Ok(record) => record,
            Err(e) => {
                warn!("Cache read failed for '{}': {}", path.display(), e);
                None
            }
        }
    }

    fn try_get(
        &self,
        path: &Path,
        current_modified_time: i64,
    ) -> Result<Option<PhotoRecord>, CacheError> {
        let key = path.to_string_lossy();

        let row: Option<(i64, String)> = {
            let conn = self.conn.lock().map_err(|_| {
                CacheError::Read(rusqlite::Error::InvalidQuery)
            })?;
            conn.query_row(
                "SELECT cached_at, record_json FROM exif_cache WHERE file_path = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(CacheError::Read)?
        };

        let Some((cached_at, record_json)) = row else {
            return Ok(None);
        };

        // Entry is reusable only when it was written strictly after the
        // file's current mtime.
        if cached_at <= current_modified_time {
            debug!("Stale cache entry for '{}', re-extracting", path.display());
            return Ok(None);
        }

        match serde_json::from_str(&record_json) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Corrupt cache entry for '{}': {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Persists an extraction result. Failures are logged and swallowed.
    pub fn put(&self, path: &Path, record: &PhotoRecord, modified_time: i64) {
        if let Err(e) = self.try_put(path, record, modified_time) {
            warn!("Cache write failed for '{}': {}", path.display(), e);
        }
    }

    fn try_put(
        &self,
        path: &Path,
        record: &PhotoRecord,
        modified_time: i64,
    ) -> Result<(), CacheError> {
        let record_json = serde_json::to_string(record).map_err(|e| {
            CacheError::Write(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        })?;

        let cached_at = chrono::Utc::now().timestamp();
        let key = path.to_string_lossy();

        let conn = self.conn.lock().map_err(|_| {
            CacheError::Write(rusqlite::Error::InvalidQuery)
        })?;

        conn.execute(
            "INSERT OR REPLACE INTO exif_cache
             (file_path, modified_time, cached_at, record_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, modified_time, cached_at, record_json],
        )
        .map_err(CacheError::Write)?;

        Ok(())
    }

    /// Number of cached entries. Diagnostic only.
    pub fn len(&self) -> usize {
        let Ok(conn) = self.conn.lock() else {
            return 0;
        };
        conn.query_row("SELECT COUNT(*) FROM exif_cache", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as usize)
        .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_record(path: &str) -> PhotoRecord {
        let mut record = PhotoRecord::from_stat(Path::new(path), 100, 1000);
        record.iso = 1600;
        record
    }

    #[test]
    fn test_miss_on_empty_cache() {
        let temp = TempDir::new().unwrap();
        let cache = MetadataCache::open(temp.path()).unwrap();

        assert!(cache.get(Path::new("/p/a.arw"), 1000).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_then_get() {
        let temp = TempDir::new().unwrap();
        let cache = MetadataCache::open(temp.path()).unwrap();

        let record = sample_record("/p/a.arw");
        cache.put(Path::new("/p/a.arw"), &record, 1000);

        // cached_at is "now", far newer than the file's mtime of 1000
        let cached = cache.get(Path::new("/p/a.arw"), 1000).unwrap();
        assert_eq!(cached.iso, 1600);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stale_entry_is_discarded() {
        let temp = TempDir::new().unwrap();
        let cache = MetadataCache::open(temp.path()).unwrap();

        let record = sample_record("/p/a.arw");
        cache.put(Path::new("/p/a.arw"), &record, 1000);

        // File modified "now" plus a day: entry no longer strictly newer
        let future_mtime = chrono::Utc::now().timestamp() + 86_400;
        assert!(cache.get(Path::new("/p/a.arw"), future_mtime).is_none());
    }

    #[test]
    fn test_replace_updates_entry() {
        let temp = TempDir::new().unwrap();
        let cache = MetadataCache::open(temp.path()).unwrap();

        let mut record = sample_record("/p/a.arw");
        cache.put(Path::new("/p/a.arw"), &record, 1000);

        record.iso = 3200;
        cache.put(Path::new("/p/a.arw"), &record, 2000);

        let cached = cache.get(Path::new("/p/a.arw"), 2000).unwrap();
        assert_eq!(cached.iso, 3200);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_survives_reopen() {
        let temp = TempDir::new().unwrap();

        {
            let cache = MetadataCache::open(temp.path()).unwrap();
            cache.put(Path::new("/p/a.arw"), &sample_record("/p/a.arw"), 1000);
        }

        let cache = MetadataCache::open(temp.path()).unwrap();
        assert!(cache.get(Path::new("/p/a.arw"), 1000).is_some());
    }

    #[test]
    fn test_open_failure_reports_path() {
        // A file where the cache directory should be
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();

        let result = MetadataCache::open(&blocker);
        assert!(matches!(result, Err(CacheError::CreateDir { .. })));
    }
}
