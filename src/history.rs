use crate::state::Snapshot;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("refusing to record snapshot without data")]
    NotSuccessful,
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write history file {path}: {source}")]
    Io { path: String, source: io::Error },
}

/// Append-only newline-delimited JSON log of successful snapshots.
///
/// Single writer (the poll loop); the log lives for one process lifetime and is
/// truncated by [`HistoryRecorder::reset`] at startup.
#[derive(Debug, Clone)]
pub struct HistoryRecorder {
    path: PathBuf,
}

impl HistoryRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn reset(&self) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| self.io_err(e))?;
        }
        fs::write(&self.path, b"").await.map_err(|e| self.io_err(e))
    }

    pub async fn record(&self, snapshot: &Snapshot) -> bool {
        match self.try_record(snapshot).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "history entry appended");
                true
            }
            Err(err) => {
                error!(error = %err, "failed to write history entry");
                false
            }
        }
    }

    pub async fn try_record(&self, snapshot: &Snapshot) -> Result<(), HistoryError> {
        if snapshot.data.is_none() || snapshot.error.is_some() {
            return Err(HistoryError::NotSuccessful);
        }
        let mut line = serde_json::to_vec(snapshot)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        let start = file.metadata().await.map_err(|e| self.io_err(e))?.len();
        if let Err(err) = write_line(&mut file, &line).await {
            // Drop a half-written line so the next append starts clean.
            if let Err(trunc) = file.set_len(start).await {
                warn!(error = %trunc, "failed to roll back partial history entry");
            }
            return Err(self.io_err(err));
        }
        Ok(())
    }

    pub async fn load(&self) -> Result<Vec<Snapshot>, HistoryError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.io_err(err)),
        };
        let mut entries = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(snapshot) => entries.push(snapshot),
                Err(err) => warn!(line = idx + 1, error = %err, "skipping corrupt history line"),
            }
        }
        Ok(entries)
    }

    fn io_err(&self, source: io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

async fn write_line(file: &mut fs::File, line: &[u8]) -> io::Result<()> {
    file.write_all(line).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn success() -> Snapshot {
        match json!({"cpu": {"usage": 3.5}, "top_processes": [{"pid": "7"}]}) {
            Value::Object(map) => Snapshot::success(map),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn appends_one_line_per_record() {
        let tmp = TempDir::new().expect("tempdir");
        let recorder = HistoryRecorder::new(tmp.path().join("history.jsonl"));
        recorder.reset().await.expect("reset");

        let first = success();
        let second = success();
        assert!(recorder.record(&first).await);
        assert!(recorder.record(&second).await);

        let text = std::fs::read_to_string(recorder.path()).expect("read");
        assert_eq!(text.lines().count(), 2);
        let loaded = recorder.load().await.expect("load");
        assert_eq!(loaded, vec![first, second]);
    }

    #[tokio::test]
    async fn reset_truncates_previous_run() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("nested").join("history.jsonl");
        let recorder = HistoryRecorder::new(&path);
        recorder.reset().await.expect("reset");
        assert!(recorder.record(&success()).await);

        recorder.reset().await.expect("second reset");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "");
    }

    #[tokio::test]
    async fn refuses_failed_snapshots() {
        let tmp = TempDir::new().expect("tempdir");
        let recorder = HistoryRecorder::new(tmp.path().join("history.jsonl"));
        recorder.reset().await.expect("reset");

        assert!(!recorder.record(&Snapshot::failure("boom")).await);
        assert!(!recorder.record(&Snapshot::default()).await);
        assert!(recorder.load().await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn load_skips_corrupt_lines() {
        let tmp = TempDir::new().expect("tempdir");
        let recorder = HistoryRecorder::new(tmp.path().join("history.jsonl"));
        recorder.reset().await.expect("reset");
        let first = success();
        assert!(recorder.record(&first).await);

        let mut text = std::fs::read_to_string(recorder.path()).expect("read");
        text.push_str("{\"timestamp\":\"2026-01-01T00:00:00Z\",\"data\":{\"cpu\n");
        std::fs::write(recorder.path(), text).expect("plant garbage");

        let second = success();
        assert!(recorder.record(&second).await);

        let loaded = recorder.load().await.expect("load");
        assert_eq!(loaded, vec![first, second]);
    }

    #[tokio::test]
    async fn write_failure_is_contained() {
        let tmp = TempDir::new().expect("tempdir");
        // A directory cannot be opened for append.
        let recorder = HistoryRecorder::new(tmp.path());
        assert!(!recorder.record(&success()).await);
        assert!(matches!(
            recorder.try_record(&success()).await,
            Err(HistoryError::Io { .. })
        ));
    }
}
