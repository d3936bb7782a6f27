use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::backoff::BackoffController;
use crate::buffer::Buffer;
use crate::consumer::identify_consumer;
use crate::error::ConfigError;
use crate::sanitize::Sanitizer;
use crate::scheduler::DeliveryScheduler;
use crate::store::DiskStore;
use crate::transport::{HttpTransport, Transport};
use crate::types::{Config, Event, IdentifyConsumerFn};

/// Upper bound on how long `shutdown()` blocks the caller. The final
/// flush itself is bounded by the transport timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Buffered analytics client.
///
/// Events are sanitized and accumulated in a bounded in-memory buffer;
/// a dedicated scheduler thread delivers them in batches with
/// exponential backoff and spills undeliverable batches to a JSONL file
/// on disk. Previously spilled events are recovered into the buffer on
/// construction. Each client owns its own scheduler thread — there is
/// no process-global state.
pub struct Client {
    buffer: Arc<Buffer>,
    sanitizer: Sanitizer,
    identify: Option<IdentifyConsumerFn>,
    dropped: Arc<AtomicU64>,
    debug: bool,
    closed: AtomicBool,
    // Joined on shutdown
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Client {
    /// Create a client and start its delivery thread.
    ///
    /// Fails synchronously on configuration problems: missing or
    /// malformed `api_key`, and any endpoint rejected by the SSRF
    /// policy (non-HTTPS outside localhost, private/reserved address).
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        validate_api_key(&config.api_key)?;
        let transport =
            HttpTransport::new(config.endpoint.clone(), config.api_key.clone())?;
        Self::with_transport(config, Box::new(transport))
    }

    /// Create a client with an injected transport. Intended for tests
    /// and embedding; the endpoint-safety checks live in
    /// [`HttpTransport`], so none are applied here.
    pub fn with_transport(
        config: Config,
        transport: Box<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let batch_size = nonzero(config.batch_size, 100);
        let max_buffer_size = nonzero(config.max_buffer_size, 10_000);
        let max_event_bytes = nonzero(config.max_event_bytes, 65_536);
        let max_storage_bytes = if config.max_storage_bytes == 0 {
            5_242_880
        } else {
            config.max_storage_bytes
        };

        let storage_path = config
            .storage_path
            .unwrap_or_else(|| default_storage_path(&config.endpoint, &config.api_key));

        let dropped = Arc::new(AtomicU64::new(0));
        let buffer = Arc::new(Buffer::new(max_buffer_size, batch_size));
        let mut store = DiskStore::new(storage_path, max_storage_bytes, Arc::clone(&dropped));

        // Startup recovery: the drain happens before the scheduler
        // thread exists, so nothing else can touch the file.
        let recovered = store.drain_all();
        if !recovered.is_empty() {
            let total = recovered.len();
            let accepted = buffer.extend(recovered);
            if accepted < total {
                let discarded = (total - accepted) as u64;
                dropped.fetch_add(discarded, Ordering::Relaxed);
                warn!(discarded, "recovered events exceed buffer capacity, dropping");
            }
            debug!(accepted, "recovered events into buffer");
        }

        let scheduler = DeliveryScheduler::new(
            Arc::clone(&buffer),
            transport,
            BackoffController::new(),
            store,
            config.flush_interval,
            config.on_error,
        );
        let handle = std::thread::Builder::new()
            .name("apibeacon-flush".to_string())
            .spawn(move || scheduler.run())
            .map_err(ConfigError::Spawn)?;

        Ok(Self {
            buffer,
            sanitizer: Sanitizer::new(max_event_bytes, config.debug, Arc::clone(&dropped)),
            identify: config.identify_consumer,
            dropped,
            debug: config.debug,
            closed: AtomicBool::new(false),
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Buffer one analytics event. Non-blocking: a full buffer drops
    /// the incoming event, and malformed events are dropped by the
    /// sanitizer; neither raises. Calls after `shutdown()` are silently
    /// ignored.
    pub fn track(&self, event: Event) {
        if self.closed.load(Ordering::Relaxed) || self.buffer.shutdown_requested() {
            return;
        }
        let Some(event) = self.sanitizer.sanitize(event) else {
            return;
        };
        if !self.buffer.push(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if self.debug {
                warn!("buffer full, dropping event");
            }
        }
    }

    /// Like [`track`](Self::track), but first fills `consumer_id` from
    /// the request headers (lowercase keys) when the event does not
    /// already carry one. Uses the `identify_consumer` override when
    /// configured, otherwise [`identify_consumer`](crate::identify_consumer).
    pub fn track_request(&self, mut event: Event, headers: &HashMap<String, String>) {
        if event.consumer_id.is_none() {
            event.consumer_id = match self.identify {
                Some(ref custom) => custom(headers),
                None => identify_consumer(headers),
            };
        }
        self.track(event);
    }

    /// Ask the scheduler to run a flush pass as soon as possible.
    /// Returns immediately; delivery happens on the scheduler thread.
    pub fn flush(&self) {
        self.buffer.request_flush();
    }

    /// Graceful shutdown: the scheduler makes exactly one final
    /// delivery attempt for everything still buffered and persists the
    /// remainder to disk on failure. Blocks until that completes or a
    /// bounded timeout elapses. Idempotent; also invoked from `Drop`.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.buffer.request_shutdown();

        if self.buffer.await_stopped(SHUTDOWN_TIMEOUT) {
            if let Some(handle) = self.thread.lock().unwrap().take() {
                let _ = handle.join();
            }
        } else {
            warn!("scheduler did not stop within the shutdown timeout");
        }
    }

    /// A cheap handle for requesting shutdown from a signal-handling
    /// thread. `request()` only flips the shutdown flag and wakes the
    /// scheduler; the final flush and any disk write run on the
    /// scheduler's own thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            buffer: Arc::clone(&self.buffer),
        }
    }

    /// Current number of buffered events.
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Total events dropped so far (sanitization, buffer overflow, and
    /// storage-cap drops).
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// See [`Client::shutdown_handle`].
#[derive(Clone)]
pub struct ShutdownHandle {
    buffer: Arc<Buffer>,
}

impl ShutdownHandle {
    /// Signal the scheduler to shut down. Does not wait; pair with
    /// [`Client::shutdown`] when the caller needs to block until the
    /// final flush completes.
    pub fn request(&self) {
        self.buffer.request_shutdown();
    }
}

fn validate_api_key(api_key: &str) -> Result<(), ConfigError> {
    if api_key.is_empty() {
        return Err(ConfigError::MissingApiKey);
    }
    if api_key.chars().any(|c| c.is_ascii_control()) {
        return Err(ConfigError::InvalidApiKey);
    }
    Ok(())
}

/// Default spill path: one file per endpoint+key pair under the temp
/// dir, so two clients with different configs never share a file.
fn default_storage_path(endpoint: &str, api_key: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    hasher.update(api_key.as_bytes());
    let digest = hasher.finalize();
    std::env::temp_dir().join(format!(
        "apibeacon-events-{}.jsonl",
        hex::encode(&digest[..6])
    ))
}

fn nonzero(value: usize, default: usize) -> usize {
    if value == 0 {
        default
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_validation() {
        assert!(matches!(
            validate_api_key(""),
            Err(ConfigError::MissingApiKey)
        ));
        assert!(matches!(
            validate_api_key("key\nwith\nnewlines"),
            Err(ConfigError::InvalidApiKey)
        ));
        assert!(matches!(
            validate_api_key("key\0"),
            Err(ConfigError::InvalidApiKey)
        ));
        assert!(validate_api_key("ak_live_123").is_ok());
    }

    #[test]
    fn default_storage_path_is_stable_per_config() {
        let a = default_storage_path("https://a.example/ingest", "k1");
        let b = default_storage_path("https://a.example/ingest", "k1");
        let c = default_storage_path("https://b.example/ingest", "k1");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.to_string_lossy().ends_with(".jsonl"));
    }
}
