use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info};

use crate::cache::MetadataCache;
use crate::error::{ExtractError, WorkerError};
use crate::extractor::{stat_file, MetadataReader};
use crate::worker::job::{Job, JobResult};

pub struct WorkerPool {
    job_sender: Sender<Job>,
    result_receiver: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Starts `worker_count` extraction workers sharing one reader and one
    /// optional cache.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(
        reader: Arc<dyn MetadataReader>,
        cache: Option<Arc<MetadataCache>>,
        worker_count: usize,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (job_sender, job_receiver) = bounded::<Job>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<JobResult>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_reader = Arc::clone(&reader);
            let worker_cache = cache.clone();

            let handle = thread::spawn(move || {
                run_worker(
                    worker_id,
                    job_rx,
                    result_tx,
                    shutdown_flag,
                    worker_reader,
                    worker_cache,
                );
            });

            workers.push(handle);
        }

        info!("Started {} extraction workers", worker_count);

        Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        }
    }

    pub fn submit(&self, job: Job) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<JobResult> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<JobResult> {
        self.result_receiver.recv().ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<Job>,
    result_sender: Sender<JobResult>,
    shutdown: Arc<AtomicBool>,
    reader: Arc<dyn MetadataReader>,
    cache: Option<Arc<MetadataCache>>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(job) => {
                let result = process_job(&job, reader.as_ref(), cache.as_deref());

                if result_sender.send(result).is_err() {
                    error!("Worker {} failed to send result", worker_id);
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

fn process_job(
    job: &Job,
    reader: &dyn MetadataReader,
    cache: Option<&MetadataCache>,
) -> JobResult {
    match job {
        Job::Single(path) => JobResult {
            outcomes: vec![(path.clone(), resolve_single(path, reader, cache))],
        },
        Job::Batch(paths) => {
            let extracted = reader.extract_batch(paths);
            let mut outcomes = Vec::with_capacity(paths.len());

            // Every batch input gets exactly one outcome; paths the tool
            // produced nothing for become per-file failures.
            for path in paths {
                let found = extracted.iter().find(|(p, _)| p == path);
                match found {
                    Some((_, record)) => {
                        if let Some(cache) = cache {
                            cache.put(path, record, record.modified_time);
                        }
                        outcomes.push((path.clone(), Ok(record.clone())));
                    }
                    None => outcomes.push((
                        path.clone(),
                        Err(ExtractError::ToolFailure(format!(
                            "no tool output for '{}'",
                            path.display()
                        ))),
                    )),
                }
            }

            JobResult { outcomes }
        }
    }
}

fn resolve_single(
    path: &Path,
    reader: &dyn MetadataReader,
    cache: Option<&MetadataCache>,
) -> Result<crate::metadata::PhotoRecord, ExtractError> {
    let mtime = stat_file(path).map(|(_, m)| m).unwrap_or(0);

    if let Some(cache) = cache {
        if let Some(record) = cache.get(path, mtime) {
            debug!("Cache hit for '{}'", path.display());
            return Ok(record);
        }
    }

    let record = reader.extract(path)?;
    if let Some(cache) = cache {
        cache.put(path, &record, record.modified_time);
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::PhotoRecord;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// Reader that fabricates records and counts invocations.
    struct CountingReader {
        calls: AtomicUsize,
    }

    impl CountingReader {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MetadataReader for CountingReader {
        fn extract(&self, path: &Path) -> Result<PhotoRecord, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut record = PhotoRecord::from_stat(path, 1, 1000);
            record.iso = 800;
            Ok(record)
        }

        fn extract_batch(&self, paths: &[PathBuf]) -> Vec<(PathBuf, PhotoRecord)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            paths
                .iter()
                .map(|p| (p.clone(), PhotoRecord::from_stat(p, 1, 1000)))
                .collect()
        }
    }

    #[test]
    fn test_pool_lifecycle() {
        let reader = Arc::new(CountingReader::new());
        let pool = WorkerPool::new(reader, None, 2);

        assert!(!pool.is_shutdown());
        pool.shutdown();
        assert!(pool.is_shutdown());
        pool.wait();
    }

    #[test]
    fn test_single_job_roundtrip() {
        let reader = Arc::new(CountingReader::new());
        let pool = WorkerPool::new(reader, None, 2);

        pool.submit(Job::Single(PathBuf::from("/p/a.arw"))).unwrap();
        let result = pool.recv_result().unwrap();

        assert_eq!(result.outcomes.len(), 1);
        assert!(result.outcomes[0].1.is_ok());

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_batch_job_produces_one_outcome_per_path() {
        let reader = Arc::new(CountingReader::new());
        let pool = WorkerPool::new(reader, None, 1);

        let paths = vec![
            PathBuf::from("/p/a.arw"),
            PathBuf::from("/p/b.arw"),
            PathBuf::from("/p/c.arw"),
        ];
        pool.submit(Job::Batch(paths.clone())).unwrap();

        let result = pool.recv_result().unwrap();
        assert_eq!(result.outcomes.len(), 3);
        let returned: Vec<&PathBuf> = result.outcomes.iter().map(|(p, _)| p).collect();
        assert_eq!(returned, paths.iter().collect::<Vec<_>>());

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_cache_short_circuits_second_resolution() {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(MetadataCache::open(temp.path()).unwrap());
        let reader = Arc::new(CountingReader::new());

        let pool = WorkerPool::new(reader.clone(), Some(cache), 1);

        // Path does not exist, so mtime stats to 0 and the cached record
        // (cached_at = now) is strictly newer on the second pass.
        let path = PathBuf::from("/p/cached.arw");
        pool.submit(Job::Single(path.clone())).unwrap();
        let first = pool.recv_result().unwrap();
        assert!(first.outcomes[0].1.is_ok());

        pool.submit(Job::Single(path)).unwrap();
        let second = pool.recv_result().unwrap();
        assert!(second.outcomes[0].1.is_ok());

        pool.shutdown();
        pool.wait();

        assert_eq!(reader.calls(), 1);
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let reader = Arc::new(CountingReader::new());
        let pool = WorkerPool::new(reader, None, 1);

        pool.shutdown();
        let result = pool.submit(Job::Single(PathBuf::from("/p/a.arw")));
        assert!(matches!(result, Err(WorkerError::ChannelClosed)));

        pool.wait();
    }
}
