use std::time::Duration;

use crate::error::{ConfigError, DeliveryError};
use crate::ssrf::validate_endpoint;
use crate::types::Event;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// One delivery attempt for one batch. Implementations never retry
/// internally — retry policy belongs to the scheduler and its backoff
/// controller.
pub trait Transport: Send {
    fn deliver(&self, batch: &[Event]) -> Result<(), DeliveryError>;
}

/// HTTPS delivery to the configured ingestion endpoint.
///
/// The endpoint is validated against the SSRF policy once, here at
/// construction. The API key travels in the `x-api-key` header and is
/// never logged.
pub struct HttpTransport {
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(endpoint: String, api_key: String) -> Result<Self, ConfigError> {
        validate_endpoint(&endpoint)?;
        Ok(Self { endpoint, api_key })
    }
}

impl Transport for HttpTransport {
    fn deliver(&self, batch: &[Event]) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(batch)?;

        let result = ureq::post(&self.endpoint)
            .timeout(SEND_TIMEOUT)
            .set("Content-Type", "application/json")
            .set("x-api-key", &self.api_key)
            .set(
                "x-apibeacon-sdk",
                concat!("rust/", env!("CARGO_PKG_VERSION")),
            )
            .send_bytes(&body);

        match result {
            Ok(resp) if (200..300).contains(&resp.status()) => Ok(()),
            Ok(resp) => Err(DeliveryError::Status(resp.status())),
            Err(ureq::Error::Status(status, _)) => Err(DeliveryError::Status(status)),
            Err(ureq::Error::Transport(err)) => Err(DeliveryError::Network(err.to_string())),
        }
    }
}
