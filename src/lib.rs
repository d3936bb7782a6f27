//! apibeacon — API analytics client SDK
//!
//! Captures per-request analytics events, buffers them in memory, and
//! delivers them in batches to an ingestion endpoint on a background
//! thread, without ever blocking the host's request path. Failed
//! batches are retried with full-jitter exponential backoff and
//! spilled to a JSONL file on disk once the retry budget is exhausted;
//! spilled events are recovered on the next startup. Endpoints are
//! validated against an SSRF policy at construction.

mod backoff;
mod buffer;
mod client;
mod consumer;
mod error;
mod sanitize;
mod scheduler;
mod ssrf;
mod store;
mod transport;
mod types;

pub use client::{Client, ShutdownHandle};
pub use consumer::{hash_consumer_id, identify_consumer};
pub use error::{ConfigError, DeliveryError, Error, StorageError};
pub use ssrf::{is_private_ip, validate_endpoint};
pub use transport::{HttpTransport, Transport};
pub use types::{Config, ErrorCallback, Event, IdentifyConsumerFn};
