//! Per-agent trigger queue (§4.4, §9). A flat, append-only file per agent —
//! `data/<agent>_queue` — so any supervisor can tail it without opening a
//! socket, the same rationale the teacher applies to `session_token` and
//! `server_started_at`. The router (in the hub process) is the sole writer;
//! the agent's own wrapper is the sole reader.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEntry {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<i64>,
    pub ts: i64,
}

fn queue_path(data_dir: &Path, agent: &str) -> PathBuf {
    data_dir.join(format!("{agent}_queue"))
}

/// Writer half, used by the router inside the hub process.
pub struct TriggerWriter {
    data_dir: PathBuf,
}

impl TriggerWriter {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn enqueue(&self, agent: &str, entry: &TriggerEntry) -> std::io::Result<()> {
        use fs2::FileExt;
        std::fs::create_dir_all(&self.data_dir)?;
        let path = queue_path(&self.data_dir, agent);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        file.lock_exclusive()?;
        let line = serde_json::to_string(entry).unwrap();
        let result = writeln!(file, "{line}");
        FileExt::unlock(&file)?;
        result
    }
}

/// Reader half, used by the agent's wrapper process. Tracks a byte offset so
/// repeated polls only return newly appended lines (§5: "cross-process
/// coordination uses the file's monotonic offset").
pub struct TriggerReader {
    path: PathBuf,
    offset: u64,
}

impl TriggerReader {
    pub fn new(data_dir: impl Into<PathBuf>, agent: &str) -> Self {
        let data_dir = data_dir.into();
        Self {
            path: queue_path(&data_dir, agent),
            offset: 0,
        }
    }

    /// Truncate the queue once at wrapper startup (§4.6 step 2) to drop
    /// stale entries left by a crashed prior session.
    pub fn truncate(&mut self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, b"")?;
        std::fs::rename(&tmp, &self.path)?;
        self.offset = 0;
        Ok(())
    }

    /// Read any entries appended since the last call.
    pub fn poll(&mut self) -> std::io::Result<Vec<TriggerEntry>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let len = file.metadata()?.len();
        if len < self.offset {
            // File was truncated/rotated underneath us; restart from the top.
            self.offset = 0;
        }
        let mut reader = std::io::BufReader::new(file);
        std::io::Seek::seek(&mut reader, std::io::SeekFrom::Start(self.offset))?;
        let mut entries = Vec::new();
        let mut consumed: u64 = self.offset;
        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            consumed += n as u64;
            if !line.ends_with('\n') {
                // Partial line written concurrently; stop here and retry next poll.
                break;
            }
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                continue;
            }
            if let Ok(entry) = serde_json::from_str::<TriggerEntry>(trimmed) {
                entries.push(entry);
            }
        }
        self.offset = consumed;
        Ok(entries)
    }

    pub fn latest(&mut self) -> std::io::Result<Option<TriggerEntry>> {
        Ok(self.poll()?.into_iter().next_back())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_then_reader_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TriggerWriter::new(dir.path());
        writer
            .enqueue(
                "claude",
                &TriggerEntry {
                    channel: "general".into(),
                    source_message_id: Some(1),
                    ts: 100,
                },
            )
            .unwrap();
        let mut reader = TriggerReader::new(dir.path(), "claude");
        let entries = reader.poll().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].channel, "general");
        // Second poll sees nothing new.
        assert!(reader.poll().unwrap().is_empty());
    }

    #[test]
    fn truncate_drops_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TriggerWriter::new(dir.path());
        writer
            .enqueue(
                "codex",
                &TriggerEntry {
                    channel: "general".into(),
                    source_message_id: None,
                    ts: 1,
                },
            )
            .unwrap();
        let mut reader = TriggerReader::new(dir.path(), "codex");
        reader.truncate().unwrap();
        assert!(reader.poll().unwrap().is_empty());
    }
}
