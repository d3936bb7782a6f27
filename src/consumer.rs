use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// SHA-256 hex digest of the raw value, prefixed with `hash_`.
pub fn hash_consumer_id(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    format!("hash_{}", hex::encode(digest))
}

/// Identify the consumer from request headers (lowercase keys).
///
/// Priority:
///   1. `x-api-key` (stored as-is)
///   2. `authorization` (hashed — contains credentials)
pub fn identify_consumer(headers: &HashMap<String, String>) -> Option<String> {
    if let Some(key) = headers.get("x-api-key") {
        if !key.is_empty() {
            return Some(key.clone());
        }
    }
    if let Some(auth) = headers.get("authorization") {
        if !auth.is_empty() {
            return Some(hash_consumer_id(auth));
        }
    }
    None
}
