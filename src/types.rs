use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// Callback invoked from the scheduler thread on any delivery or
/// persistence failure.
pub type ErrorCallback = Box<dyn Fn(&Error) + Send + Sync>;

/// Callback for custom consumer identification. Receives the request
/// headers (lowercase keys) and returns an optional consumer ID. Fully
/// replaces [`crate::identify_consumer`] when set.
pub type IdentifyConsumerFn =
    Box<dyn Fn(&HashMap<String, String>) -> Option<String> + Send + Sync>;

/// A single captured API request event.
///
/// Immutable once enqueued: the sanitizer truncates fields and stamps
/// the timestamp before the event enters the buffer, and nothing
/// mutates it afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub response_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Set at enqueue time when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Client configuration.
pub struct Config {
    /// API key for authenticating with the ingestion endpoint (required).
    pub api_key: String,
    /// URL of the ingestion endpoint (required). HTTPS, or plain HTTP
    /// for localhost only.
    pub endpoint: String,
    /// Time between automatic flushes. Default: 10s.
    pub flush_interval: Duration,
    /// Number of buffered events that triggers an early flush. Default: 100.
    pub batch_size: usize,
    /// Maximum number of events held in memory. Default: 10,000.
    pub max_buffer_size: usize,
    /// Maximum size of the spill file in bytes. Default: 5 MB.
    pub max_storage_bytes: u64,
    /// Maximum size of a single serialized event in bytes. Default: 64 KB.
    pub max_event_bytes: usize,
    /// File path for persisting undelivered events.
    /// Default: `<temp_dir>/apibeacon-events-<hash>.jsonl`.
    pub storage_path: Option<PathBuf>,
    /// Enable verbose per-event drop logging.
    pub debug: bool,
    /// Optional error callback invoked from the scheduler thread.
    pub on_error: Option<ErrorCallback>,
    /// Optional override for consumer identification.
    pub identify_consumer: Option<IdentifyConsumerFn>,
}

impl Config {
    /// Configuration with required fields only; all others use defaults.
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            flush_interval: Duration::from_secs(10),
            batch_size: 100,
            max_buffer_size: 10_000,
            max_storage_bytes: 5_242_880,
            max_event_bytes: 65_536,
            storage_path: None,
            debug: false,
            on_error: None,
            identify_consumer: None,
        }
    }
}
