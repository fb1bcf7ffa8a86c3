//! Extraction pipeline: resume filtering, job fan-out over the worker pool,
//! result collection, and progress marking.

pub mod progress;

pub use progress::ProgressMarker;

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::cache::MetadataCache;
use crate::error::ExtractError;
use crate::extractor::{stat_file, MetadataReader};
use crate::metadata::PhotoRecord;
use crate::worker::{Job, JobResult, WorkerPool};

pub struct ExtractionPipeline {
    reader: Arc<dyn MetadataReader>,
    cache: Option<Arc<MetadataCache>>,
    max_workers: usize,
    batch_size: usize,
}

/// Settled output of one extraction pass: every input path appears either in
/// `records` or in `failures`.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub records: Vec<PhotoRecord>,
    pub failures: Vec<(PathBuf, ExtractError)>,
    /// Paths resolved from the progress marker plus cache, without touching
    /// the pool.
    pub resumed: usize,
}

impl ExtractionPipeline {
    pub fn new(
        reader: Arc<dyn MetadataReader>,
        cache: Option<Arc<MetadataCache>>,
        max_workers: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            reader,
            cache,
            max_workers: max_workers.max(1),
            batch_size: batch_size.max(1),
        }
    }

    /// Extracts metadata for every path, using the marker (when given) to
    /// skip work already settled by a previous run. Runs to full settlement:
    /// each path yields a record or a terminal failure.
    pub fn run(
        &self,
        paths: &[PathBuf],
        mut marker: Option<&mut ProgressMarker>,
    ) -> ExtractionOutcome {
        let mut outcome = ExtractionOutcome::default();
        let mut pending: Vec<PathBuf> = Vec::with_capacity(paths.len());

        // Marker-listed paths are resolved synchronously from the cache. A
        // miss (evicted, stale, or cache disabled) re-enqueues the path.
        for path in paths {
            let listed = marker.as_deref().is_some_and(|m| m.contains(path));
            if listed {
                if let Some(record) = self.resolve_from_cache(path) {
                    outcome.records.push(record);
                    outcome.resumed += 1;
                    continue;
                }
                debug!(
                    "Marker lists '{}' but cache cannot supply it, re-extracting",
                    path.display()
                );
            }
            pending.push(path.clone());
        }

        if outcome.resumed > 0 {
            info!("Resumed {} path(s) from progress marker", outcome.resumed);
        }

        if pending.is_empty() {
            return outcome;
        }

        let pool = WorkerPool::new(Arc::clone(&self.reader), self.cache.clone(), self.max_workers);
        let expected = pending.len();
        let mut settled = 0usize;

        for job in self.make_jobs(pending) {
            // Drain available results before a potentially blocking submit
            // so a full result queue cannot back up into the job queue.
            while let Some(result) = pool.try_recv_result() {
                settled += collect(result, &mut outcome, &mut marker);
            }

            if pool.submit(job).is_err() {
                warn!("Worker pool rejected a job, aborting extraction pass");
                break;
            }
        }

        while settled < expected {
            match pool.recv_result() {
                Some(result) => settled += collect(result, &mut outcome, &mut marker),
                None => {
                    warn!(
                        "Result channel closed with {} of {} paths settled",
                        settled, expected
                    );
                    break;
                }
            }
        }

        pool.shutdown();
        pool.wait();

        if let Some(marker) = marker {
            marker.flush();
        }

        info!(
            "Extraction settled: {} record(s), {} failure(s)",
            outcome.records.len(),
            outcome.failures.len()
        );
        outcome
    }

    fn resolve_from_cache(&self, path: &PathBuf) -> Option<PhotoRecord> {
        let cache = self.cache.as_ref()?;
        let mtime = stat_file(path).map(|(_, m)| m).unwrap_or(0);
        cache.get(path, mtime)
    }

    /// With a cache, single jobs let each path hit or miss independently.
    /// Without one, batching amortizes tool startup across `batch_size`
    /// files.
    fn make_jobs(&self, pending: Vec<PathBuf>) -> Vec<Job> {
        if self.cache.is_some() {
            pending.into_iter().map(Job::Single).collect()
        } else {
            pending
                .chunks(self.batch_size)
                .map(|chunk| Job::Batch(chunk.to_vec()))
                .collect()
        }
    }
}

/// Folds one job result into the outcome, marking every terminal path.
/// Returns the number of paths settled.
fn collect(
    result: JobResult,
    outcome: &mut ExtractionOutcome,
    marker: &mut Option<&mut ProgressMarker>,
) -> usize {
    let settled = result.outcomes.len();

    for (path, resolution) in result.outcomes {
        if let Some(marker) = marker.as_deref_mut() {
            marker.record(&path);
        }

        match resolution {
            Ok(record) => outcome.records.push(record),
            Err(e) => {
                warn!("Extraction failed for '{}': {}", path.display(), e);
                outcome.failures.push((path, e));
            }
        }
    }

    settled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StubReader {
        extract_calls: AtomicUsize,
        batch_calls: AtomicUsize,
        fail_suffix: Option<String>,
    }

    impl StubReader {
        fn new() -> Self {
            Self {
                extract_calls: AtomicUsize::new(0),
                batch_calls: AtomicUsize::new(0),
                fail_suffix: None,
            }
        }

        fn failing_on(suffix: &str) -> Self {
            Self {
                fail_suffix: Some(suffix.to_string()),
                ..Self::new()
            }
        }

        fn should_fail(&self, path: &Path) -> bool {
            self.fail_suffix
                .as_ref()
                .is_some_and(|s| path.to_string_lossy().ends_with(s.as_str()))
        }
    }

    impl MetadataReader for StubReader {
        fn extract(&self, path: &Path) -> Result<PhotoRecord, ExtractError> {
            self.extract_calls.fetch_add(1, Ordering::SeqCst);
            if self.should_fail(path) {
                return Err(ExtractError::ToolFailure("stub failure".to_string()));
            }
            Ok(PhotoRecord::from_stat(path, 1, 1000))
        }

        fn extract_batch(&self, paths: &[PathBuf]) -> Vec<(PathBuf, PhotoRecord)> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            paths
                .iter()
                .filter(|p| !self.should_fail(p))
                .map(|p| (p.clone(), PhotoRecord::from_stat(p, 1, 1000)))
                .collect()
        }
    }

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n)
            .map(|i| PathBuf::from(format!("/p/DSC{:05}.ARW", i)))
            .collect()
    }

    #[test]
    fn test_uncached_run_batches() {
        let reader = Arc::new(StubReader::new());
        let pipeline = ExtractionPipeline::new(reader.clone(), None, 2, 4);

        let outcome = pipeline.run(&paths(10), None);

        assert_eq!(outcome.records.len(), 10);
        assert!(outcome.failures.is_empty());
        // 10 paths in chunks of 4: three batch invocations
        assert_eq!(reader.batch_calls.load(Ordering::SeqCst), 3);
        assert_eq!(reader.extract_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failures_settle_without_aborting() {
        let reader = Arc::new(StubReader::failing_on("00003.ARW"));
        let pipeline = ExtractionPipeline::new(reader, None, 2, 50);

        let outcome = pipeline.run(&paths(6), None);

        assert_eq!(outcome.records.len(), 5);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0]
            .0
            .to_string_lossy()
            .ends_with("00003.ARW"));
    }

    #[test]
    fn test_resume_skips_marker_listed_paths() {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(MetadataCache::open(temp.path().join("cache")).unwrap());
        let reader = Arc::new(StubReader::new());

        let input = paths(5);

        // First run settles everything and fills marker plus cache.
        let mut marker = ProgressMarker::load(temp.path().join("progress.json"));
        let pipeline =
            ExtractionPipeline::new(reader.clone(), Some(Arc::clone(&cache)), 2, 50);
        let first = pipeline.run(&input, Some(&mut marker));
        assert_eq!(first.records.len(), 5);
        assert_eq!(reader.extract_calls.load(Ordering::SeqCst), 5);
        marker.flush();

        // Second run resolves every path from marker plus cache.
        let mut marker = ProgressMarker::load(temp.path().join("progress.json"));
        let second = pipeline.run(&input, Some(&mut marker));
        assert_eq!(second.records.len(), 5);
        assert_eq!(second.resumed, 5);
        assert_eq!(reader.extract_calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_marker_without_cache_reextracts() {
        let temp = TempDir::new().unwrap();
        let reader = Arc::new(StubReader::new());
        let pipeline = ExtractionPipeline::new(reader, None, 1, 50);

        let input = paths(3);
        let mut marker = ProgressMarker::load(temp.path().join("progress.json"));
        for p in &input {
            marker.record(p);
        }

        let outcome = pipeline.run(&input, Some(&mut marker));
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.resumed, 0);
    }

    #[test]
    fn test_marker_records_failures_as_terminal() {
        let temp = TempDir::new().unwrap();
        let reader = Arc::new(StubReader::failing_on("00001.ARW"));
        let pipeline = ExtractionPipeline::new(reader, None, 1, 50);

        let input = paths(3);
        let marker_path = temp.path().join("progress.json");
        let mut marker = ProgressMarker::load(&marker_path);
        pipeline.run(&input, Some(&mut marker));
        marker.flush();

        let reloaded = ProgressMarker::load(&marker_path);
        assert_eq!(reloaded.len(), 3);
        assert!(reloaded.contains(Path::new("/p/DSC00001.ARW")));
    }

    #[test]
    fn test_empty_input() {
        let pipeline = ExtractionPipeline::new(Arc::new(StubReader::new()), None, 2, 50);
        let outcome = pipeline.run(&[], None);

        assert!(outcome.records.is_empty());
        assert!(outcome.failures.is_empty());
    }
}
