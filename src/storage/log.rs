//! Durable event log
//!
//! Every accepted event is appended to the collection's log before the insert
//! is acknowledged. On startup the log is replayed in file order and the
//! replay order becomes the position sequence.
//!
//! Format: one JSON object per line, `id` included.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::StoredEvent;
use serde::Deserialize;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Sync strategy for log writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogSyncMode {
    /// Fsync after every append (safest, slowest)
    EveryWrite,
    /// Flush every append, fsync once enough bytes accumulate
    #[default]
    Batched,
    /// Flush to the OS, never fsync
    None,
}

/// Append-only JSON-lines event log
///
/// Lines go straight to the file, unbuffered: once `append` returns, the
/// line has reached the OS, and a failed append leaves no bytes behind for
/// a later one to carry along.
pub struct EventLog {
    file: File,
    path: PathBuf,
    /// File length covered by acknowledged appends
    committed_len: u64,
    entry_count: u64,
    bytes_since_sync: usize,
    sync_mode: LogSyncMode,
    sync_threshold: usize,
}

impl EventLog {
    /// Open or create a log file
    pub fn open(path: impl AsRef<Path>, sync_mode: LogSyncMode) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let entry_count = Self::count_entries(&path)?;

        if !Self::ends_with_newline(&path)? {
            // a torn tail must not swallow the next append
            file.write_all(b"\n")?;
        }
        let committed_len = file.metadata()?.len();

        Ok(Self {
            file,
            path,
            committed_len,
            entry_count,
            bytes_since_sync: 0,
            sync_mode,
            sync_threshold: 64 * 1024,
        })
    }

    fn count_entries(path: &Path) -> StorageResult<u64> {
        if !path.exists() {
            return Ok(0);
        }
        Ok(LogIterator::new(path)?.filter(Result::is_ok).count() as u64)
    }

    fn ends_with_newline(path: &Path) -> StorageResult<bool> {
        let mut file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(true);
        }
        file.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        Ok(last[0] == b'\n')
    }

    /// Append one event as a JSON line
    ///
    /// On failure the file is cut back to its last acknowledged length, so
    /// the rejected event can never be replayed.
    pub fn append(&mut self, event: &StoredEvent) -> StorageResult<()> {
        let mut line = serde_json::to_vec(&event.event)?;
        line.push(b'\n');

        self.discard_uncommitted()?;

        if let Err(e) = self.file.write_all(&line) {
            if let Err(truncate) = self.file.set_len(self.committed_len) {
                tracing::warn!(
                    "Could not roll back partial append to {:?}: {}",
                    self.path,
                    truncate
                );
            }
            return Err(StorageError::Persistence(format!(
                "failed to append to {}: {}",
                self.path.display(),
                e
            )));
        }

        self.committed_len += line.len() as u64;
        self.entry_count += 1;
        self.bytes_since_sync += line.len();

        self.maybe_sync()
    }

    /// Drop bytes past the acknowledged length, left by a failed write
    fn discard_uncommitted(&mut self) -> StorageResult<()> {
        let on_disk = self.file.metadata()?.len();
        if on_disk > self.committed_len {
            tracing::warn!(
                "Discarding {} unacknowledged bytes at the end of {:?}",
                on_disk - self.committed_len,
                self.path
            );
            self.file.set_len(self.committed_len).map_err(|e| {
                StorageError::Persistence(format!(
                    "failed to truncate {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    fn maybe_sync(&mut self) -> StorageResult<()> {
        match self.sync_mode {
            LogSyncMode::EveryWrite => self.sync(),
            LogSyncMode::Batched if self.bytes_since_sync >= self.sync_threshold => self.sync(),
            LogSyncMode::Batched | LogSyncMode::None => Ok(()),
        }
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> StorageResult<()> {
        self.file
            .sync_all()
            .map_err(|e| StorageError::Persistence(format!("fsync failed: {}", e)))?;
        self.bytes_since_sync = 0;
        Ok(())
    }

    /// Read every intact entry for replay
    ///
    /// Unparsable lines (a torn write) are skipped with a warning. Positions
    /// are assigned from the order of the entries that survive.
    pub fn replay(&self) -> StorageResult<Vec<StoredEvent>> {
        let mut events = Vec::new();
        let mut skipped = 0usize;

        for entry in LogIterator::new(&self.path)? {
            match entry {
                Ok(value) => match StoredEvent::from_log(events.len(), value) {
                    Some(event) => events.push(event),
                    None => {
                        tracing::warn!(
                            "Skipping log entry after position {}: not a JSON object",
                            events.len()
                        );
                        skipped += 1;
                    }
                },
                Err(StorageError::Io(e)) => return Err(StorageError::Io(e)),
                Err(e) => {
                    tracing::warn!("Skipping log entry after position {}: {}", events.len(), e);
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            tracing::warn!(
                "Replayed {} events from {:?}, skipped {} corrupt lines",
                events.len(),
                self.path,
                skipped
            );
        }

        Ok(events)
    }

    /// Get the number of entries in the log
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Streaming reader over log lines
pub struct LogIterator {
    lines: std::io::Lines<BufReader<File>>,
    line_no: u64,
}

impl LogIterator {
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

impl Iterator for LogIterator {
    type Item = StorageResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;

            // blank lines carry no entry
            if line.trim().is_empty() {
                continue;
            }

            return Some(serde_json::from_str(&line).map_err(|e| {
                StorageError::Corruption(format!("line {}: {}", self.line_no, e))
            }));
        }
    }
}

/// Append-only sink for events the validator rejected
///
/// One line per rejection: `<message> - <json>`.
pub struct RejectionLog {
    path: PathBuf,
}

impl RejectionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Record a rejected payload with the reason it was refused
    pub fn record(&self, message: &str, payload: &Value) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = format!("{} - {}\n", message, serde_json::to_string(payload)?);
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
