use thiserror::Error;

/// Configuration problems detected at client construction.
///
/// These are raised synchronously from [`crate::Client::new`] so a
/// misconfigured integration fails immediately instead of silently
/// discarding all telemetry at runtime.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("'api_key' is required")]
    MissingApiKey,

    #[error("'api_key' contains control characters")]
    InvalidApiKey,

    #[error("'endpoint' is required")]
    MissingEndpoint,

    #[error("invalid endpoint URL: {0}")]
    MalformedEndpoint(String),

    #[error("endpoint must use HTTPS; plain HTTP is only allowed for localhost: {0}")]
    InsecureEndpoint(String),

    #[error("endpoint URL must not contain credentials")]
    EndpointCredentials,

    #[error("endpoint must not point to a private or reserved address: {0}")]
    PrivateEndpoint(String),

    #[error("failed to spawn delivery thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A failed delivery attempt. The scheduler decides whether to retry,
/// back off, or spill to disk; the transport never retries internally.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("ingestion endpoint returned HTTP {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to encode event batch: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DeliveryError {
    /// Whether another attempt at the same batch could plausibly succeed.
    /// Rejected payloads (4xx other than 429) and encode failures cannot.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Status(status) => *status == 429 || *status >= 500,
            DeliveryError::Network(_) => true,
            DeliveryError::Encode(_) => false,
        }
    }
}

/// A failed disk spill. There is no further fallback tier; affected
/// events are dropped after this is reported.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage file full ({size} of {cap} bytes)")]
    Full { size: u64, cap: u64 },

    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode event for storage: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Umbrella error handed to the `on_error` callback. Nothing from the
/// background scheduler ever propagates as a panic or return value into
/// the host's request path.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
