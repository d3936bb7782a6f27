use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StorageError;
use crate::types::Event;

/// Append-only JSONL persistence for undelivered events, capped at
/// `max_bytes`. One serialized event per line. The file is created
/// lazily on first spill and drained exactly once at startup.
pub struct DiskStore {
    path: PathBuf,
    max_bytes: u64,
    dropped: Arc<AtomicU64>,
}

impl DiskStore {
    pub fn new(path: PathBuf, max_bytes: u64, dropped: Arc<AtomicU64>) -> Self {
        Self {
            path,
            max_bytes,
            dropped,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist events, all-or-nothing per event: any event whose line
    /// would push the file past the cap is skipped and counted as
    /// dropped; the remaining events still append. Returns the number
    /// persisted.
    pub fn append(&mut self, events: &[Event]) -> Result<usize, StorageError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut size = self.current_size_bytes();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut persisted = 0usize;

        for event in events {
            let mut line = serde_json::to_vec(event)?;
            line.push(b'\n');

            if size + line.len() as u64 > self.max_bytes {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            file.write_all(&line)?;
            size += line.len() as u64;
            persisted += 1;
        }

        let skipped = events.len() - persisted;
        if skipped > 0 {
            warn!(
                skipped,
                cap = self.max_bytes,
                "storage file full, dropping overflow events"
            );
            return Err(StorageError::Full {
                size,
                cap: self.max_bytes,
            });
        }

        debug!(persisted, path = %self.path.display(), "spilled events to disk");
        Ok(persisted)
    }

    /// Read every persisted event, then remove the file so restarts
    /// never redeliver the same events twice (at-least-once: a crash
    /// between drain and re-enqueue can still lose them). Malformed
    /// lines are skipped and logged, not fatal. Startup-only path.
    pub fn drain_all(&mut self) -> Vec<Event> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(), // nothing spilled yet
        };

        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(l) => l,
                Err(err) => {
                    warn!(%err, "unreadable line in storage file, stopping drain");
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => events.push(event),
                // Older writers stored a whole batch as one JSON array line
                Err(_) => match serde_json::from_str::<Vec<Event>>(line) {
                    Ok(batch) => events.extend(batch),
                    Err(err) => warn!(%err, "skipping malformed line in storage file"),
                },
            }
        }

        if let Err(err) = fs::remove_file(&self.path) {
            warn!(%err, "failed to remove drained storage file");
        }
        if !events.is_empty() {
            debug!(count = events.len(), "recovered events from disk");
        }
        events
    }

    pub fn current_size_bytes(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }
}
