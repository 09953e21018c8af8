use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Destination for a target's progress and error text. Writes are raw
/// bytes, and may contain carriage returns and terminal escapes.
pub trait LogSink: Send + Sync {
    fn write(&self, bytes: &[u8]);
}

/// Log sink for one target: every write goes to `tracing`, and is appended
/// to `{logs_dir}/{target_id}.log` when a directory is configured.
pub struct TargetLogWriter {
    target_id: String,
    file: Option<Mutex<File>>,
}

impl TargetLogWriter {
    pub fn new(target_id: &str, logs_dir: Option<&Path>) -> io::Result<Self> {
        let file = match logs_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(log_path(dir, target_id))?;
                Some(Mutex::new(file))
            }
            None => None,
        };

        Ok(Self {
            target_id: target_id.to_string(),
            file,
        })
    }

    /// Writer that only forwards to `tracing`.
    pub fn tracing_only(target_id: &str) -> Self {
        Self {
            target_id: target_id.to_string(),
            file: None,
        }
    }

    /// Write `msg` followed by a newline.
    pub fn line(&self, msg: &str) {
        self.write(format!("{msg}\n").as_bytes());
    }
}

impl LogSink for TargetLogWriter {
    fn write(&self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        // spinner frames end in '\r' and are rewritten every tick
        if text.ends_with('\r') {
            tracing::trace!(target_id = %self.target_id, "{}", text.trim_end());
        } else if !text.trim().is_empty() {
            tracing::info!(target_id = %self.target_id, "{}", text.trim_end());
        }

        // Blocking append on the caller's task. Writes are a line or a
        // spinner frame every few hundred milliseconds.
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = file.write_all(bytes) {
                tracing::warn!(target_id = %self.target_id, error = %e, "failed to write target log");
            }
        }
    }
}

pub fn log_path(dir: &Path, target_id: &str) -> PathBuf {
    dir.join(format!("{target_id}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_raw_bytes_to_target_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TargetLogWriter::new("t1", Some(dir.path())).unwrap();

        writer.write("⠋ Waiting\r".as_bytes());
        writer.line("Target created");
        drop(writer);

        let again = TargetLogWriter::new("t1", Some(dir.path())).unwrap();
        again.line("second run");

        let contents = std::fs::read_to_string(log_path(dir.path(), "t1")).unwrap();
        assert_eq!(contents, "⠋ Waiting\rTarget created\nsecond run\n");
    }

    #[test]
    fn creates_missing_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs").join("targets");

        TargetLogWriter::new("t2", Some(&nested)).unwrap().line("hello");

        assert!(log_path(&nested, "t2").is_file());
    }
}
