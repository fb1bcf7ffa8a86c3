//! Metadata extraction via an external tool.
//!
//! The subprocess invocation lives behind the [`MetadataReader`] trait so an
//! in-process reader (or a test mock) can be substituted without touching the
//! pipeline.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde_json::Value;

use crate::error::ExtractError;
use crate::metadata::PhotoRecord;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub trait MetadataReader: Send + Sync {
    /// Extracts metadata for a single file.
    fn extract(&self, path: &Path) -> Result<PhotoRecord, ExtractError>;

    /// Extracts metadata for a batch of files in one tool invocation,
    /// silently omitting entries the tool could not produce. One bad file
    /// never fails the whole batch.
    fn extract_batch(&self, paths: &[PathBuf]) -> Vec<(PathBuf, PhotoRecord)>;
}

/// Reads metadata by shelling out to `exiftool -j`.
pub struct ExiftoolReader {
    command: String,
    timeout: Duration,
    batch_timeout: Duration,
}

impl ExiftoolReader {
    pub fn new(timeout_secs: u64, batch_timeout_secs: u64) -> Self {
        Self::with_command("exiftool", timeout_secs, batch_timeout_secs)
    }

    /// Overrides the tool binary. Used by tests and by callers with a
    /// non-PATH exiftool installation.
    pub fn with_command(command: &str, timeout_secs: u64, batch_timeout_secs: u64) -> Self {
        Self {
            command: command.to_string(),
            timeout: Duration::from_secs(timeout_secs),
            batch_timeout: Duration::from_secs(batch_timeout_secs),
        }
    }

    fn run_tool(&self, paths: &[PathBuf], timeout: Duration) -> Result<ToolOutput, ExtractError> {
        let mut cmd = Command::new(&self.command);
        cmd.arg("-j");
        cmd.args(paths);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            ExtractError::ToolFailure(format!("failed to spawn '{}': {}", self.command, e))
        })?;

        // Drain pipes on helper threads so a large batch output cannot fill
        // the pipe buffer and stall the child.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_thread = std::thread::spawn(move || read_pipe(stdout_pipe));
        let stderr_thread = std::thread::spawn(move || read_pipe(stderr_pipe));

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ExtractError::Timeout {
                            path: paths.first().cloned().unwrap_or_default(),
                            timeout_secs: timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(ExtractError::ToolFailure(format!(
                        "failed to wait for '{}': {}",
                        self.command, e
                    )));
                }
            }
        };

        let stdout = stdout_thread.join().unwrap_or_default();
        let stderr = stderr_thread.join().unwrap_or_default();

        Ok(ToolOutput {
            success: status.success(),
            stdout,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

struct ToolOutput {
    success: bool,
    stdout: Vec<u8>,
    stderr: String,
}

fn read_pipe<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

impl MetadataReader for ExiftoolReader {
    fn extract(&self, path: &Path) -> Result<PhotoRecord, ExtractError> {
        let output = self.run_tool(std::slice::from_ref(&path.to_path_buf()), self.timeout)?;

        if !output.success {
            return Err(ExtractError::ToolFailure(format!(
                "'{}' returned nonzero for '{}': {}",
                self.command,
                path.display(),
                output.stderr.trim()
            )));
        }

        let entries: Vec<Value> = serde_json::from_slice(&output.stdout)
            .map_err(|e| ExtractError::ParseFailure(e.to_string()))?;
        let exif = entries.first().ok_or_else(|| {
            ExtractError::ParseFailure(format!("empty tool output for '{}'", path.display()))
        })?;

        let (file_size, modified_time) = stat_file(path).unwrap_or((0, 0));
        Ok(PhotoRecord::from_exif(path, exif, file_size, modified_time))
    }

    fn extract_batch(&self, paths: &[PathBuf]) -> Vec<(PathBuf, PhotoRecord)> {
        if paths.is_empty() {
            return Vec::new();
        }

        let output = match self.run_tool(paths, self.batch_timeout) {
            Ok(output) => output,
            Err(e) => {
                warn!("Batch extraction of {} files failed: {}", paths.len(), e);
                return Vec::new();
            }
        };

        // exiftool exits nonzero when some batch members fail but still
        // emits JSON for the rest, so the output is parsed regardless of
        // exit status.
        let entries: Vec<Value> = match serde_json::from_slice(&output.stdout) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Unparsable batch output for {} files ({}): {}",
                    paths.len(),
                    e,
                    output.stderr.trim()
                );
                return Vec::new();
            }
        };

        // Match output entries back to inputs by SourceFile; a dropped entry
        // drops only its own file.
        let inputs: HashMap<&Path, &PathBuf> =
            paths.iter().map(|p| (p.as_path(), p)).collect();

        let mut results = Vec::with_capacity(entries.len());
        for exif in &entries {
            let Some(source) = exif.get("SourceFile").and_then(Value::as_str) else {
                continue;
            };
            let Some(path) = inputs.get(Path::new(source)) else {
                debug!("Ignoring unexpected batch entry for '{}'", source);
                continue;
            };

            let (file_size, modified_time) = stat_file(path).unwrap_or((0, 0));
            results.push((
                (*path).clone(),
                PhotoRecord::from_exif(path, exif, file_size, modified_time),
            ));
        }

        results
    }
}

/// Returns (size, mtime in unix seconds) for a file.
pub fn stat_file(path: &Path) -> std::io::Result<(u64, i64)> {
    let meta = std::fs::metadata(path)?;
    let mtime = meta
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok((meta.len(), mtime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn write_fake_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        write!(file, "{}", script).unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_spawn_failure_is_tool_failure() {
        let reader = ExiftoolReader::with_command("/nonexistent/exiftool", 5, 5);
        let result = reader.extract(Path::new("/tmp/a.arw"));

        assert!(matches!(result, Err(ExtractError::ToolFailure(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_parses_tool_json() {
        let temp = TempDir::new().unwrap();
        let photo = temp.path().join("a.arw");
        std::fs::write(&photo, b"raw bytes").unwrap();

        let tool = write_fake_tool(
            temp.path(),
            "fake-exiftool",
            r#"echo '[{"FocalLength":"85.0 mm","FNumber":1.8,"ISO":400}]'
"#,
        );

        let reader = ExiftoolReader::with_command(tool.to_str().unwrap(), 5, 5);
        let record = reader.extract(&photo).unwrap();

        assert_eq!(record.focal_length_mm, 85.0);
        assert_eq!(record.iso, 400);
        assert_eq!(record.file_size, 9);
        assert!(record.modified_time > 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_tool_failure() {
        let temp = TempDir::new().unwrap();
        let tool = write_fake_tool(
            temp.path(),
            "fake-exiftool",
            "echo 'broken file' >&2\nexit 1\n",
        );

        let reader = ExiftoolReader::with_command(tool.to_str().unwrap(), 5, 5);
        let result = reader.extract(Path::new("/tmp/a.arw"));

        match result {
            Err(ExtractError::ToolFailure(msg)) => assert!(msg.contains("broken file")),
            other => panic!("expected ToolFailure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_malformed_output_is_parse_failure() {
        let temp = TempDir::new().unwrap();
        let tool = write_fake_tool(temp.path(), "fake-exiftool", "echo 'not json'\n");

        let reader = ExiftoolReader::with_command(tool.to_str().unwrap(), 5, 5);
        let result = reader.extract(Path::new("/tmp/a.arw"));

        assert!(matches!(result, Err(ExtractError::ParseFailure(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_tool() {
        let temp = TempDir::new().unwrap();
        let tool = write_fake_tool(temp.path(), "fake-exiftool", "sleep 30\n");

        let reader = ExiftoolReader::with_command(tool.to_str().unwrap(), 1, 1);
        let start = Instant::now();
        let result = reader.extract(Path::new("/tmp/a.arw"));

        assert!(matches!(result, Err(ExtractError::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_batch_drops_only_missing_entries() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("good.arw");
        let bad = temp.path().join("bad.arw");
        std::fs::write(&good, b"x").unwrap();
        std::fs::write(&bad, b"x").unwrap();

        // Emits an entry only for good.arw, then exits nonzero like exiftool
        // does when some batch members fail.
        let script = format!(
            "echo '[{{\"SourceFile\":\"{}\",\"ISO\":800}}]'\nexit 1\n",
            good.display()
        );
        let tool = write_fake_tool(temp.path(), "fake-exiftool", &script);

        let reader = ExiftoolReader::with_command(tool.to_str().unwrap(), 5, 5);
        let results = reader.extract_batch(&[good.clone(), bad]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, good);
        assert_eq!(results[0].1.iso, 800);
    }

    #[cfg(unix)]
    #[test]
    fn test_batch_failure_returns_empty() {
        let reader = ExiftoolReader::with_command("/nonexistent/exiftool", 5, 5);
        let results = reader.extract_batch(&[PathBuf::from("/tmp/a.arw")]);

        assert!(results.is_empty());
    }
}
