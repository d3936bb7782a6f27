use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::types::Event;

pub const MAX_PATH_LENGTH: usize = 2048;
pub const MAX_METHOD_LENGTH: usize = 16;
pub const MAX_CONSUMER_ID_LENGTH: usize = 256;

/// Normalizes and bounds the size of a raw event before it may enter
/// the buffer. No I/O; the only shared state it touches is the dropped
/// counter.
pub struct Sanitizer {
    max_event_bytes: usize,
    debug: bool,
    dropped: Arc<AtomicU64>,
}

impl Sanitizer {
    pub fn new(max_event_bytes: usize, debug: bool, dropped: Arc<AtomicU64>) -> Self {
        Self {
            max_event_bytes,
            debug,
            dropped,
        }
    }

    /// Truncate oversized fields, stamp a timestamp, and enforce the
    /// per-event size limit. Returns `None` when the event cannot be
    /// brought under `max_event_bytes` even with metadata stripped;
    /// such drops are counted, never raised.
    pub fn sanitize(&self, mut event: Event) -> Option<Event> {
        truncate_utf8(&mut event.method, MAX_METHOD_LENGTH);
        event.method = event.method.to_uppercase();
        truncate_utf8(&mut event.path, MAX_PATH_LENGTH);
        if let Some(ref mut consumer_id) = event.consumer_id {
            truncate_utf8(consumer_id, MAX_CONSUMER_ID_LENGTH);
        }

        if event.timestamp.is_none() {
            event.timestamp = Some(Utc::now());
        }

        let size = serialized_len(&event)?;
        if size > self.max_event_bytes {
            event.metadata = None;
            let stripped = serialized_len(&event)?;
            if stripped > self.max_event_bytes {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                if self.debug {
                    warn!(bytes = stripped, "event too large, dropping");
                }
                return None;
            }
        }

        Some(event)
    }
}

fn serialized_len(event: &Event) -> Option<usize> {
    serde_json::to_vec(event).map(|raw| raw.len()).ok()
}

/// Byte-length truncation that never splits a multi-byte character.
fn truncate_utf8(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
