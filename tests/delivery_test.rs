use apibeacon::{hash_consumer_id, Client, Config, DeliveryError, Event, Transport};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct CapturingTransport {
    delivered: Arc<Mutex<Vec<Vec<Event>>>>,
}

impl Transport for CapturingTransport {
    fn deliver(&self, batch: &[Event]) -> Result<(), DeliveryError> {
        self.delivered.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

fn capturing() -> (Box<CapturingTransport>, Arc<Mutex<Vec<Vec<Event>>>>) {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    (
        Box::new(CapturingTransport {
            delivered: Arc::clone(&delivered),
        }),
        delivered,
    )
}

fn event(path: &str) -> Event {
    Event {
        method: "GET".to_string(),
        path: path.to_string(),
        status_code: 200,
        response_time_ms: 3.5,
        ..Event::default()
    }
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        assert!(start.elapsed() < deadline, "condition not met in time");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn interval_flush_delivers_exactly_the_tracked_event() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, delivered) = capturing();
    let mut cfg = Config::new("ak_test", "https://ingest.example.com/v1/events");
    cfg.storage_path = Some(dir.path().join("events.jsonl"));
    cfg.flush_interval = Duration::from_millis(50);
    let client = Client::with_transport(cfg, transport).unwrap();

    client.track(event("/solo"));

    wait_until(Duration::from_secs(5), || {
        !delivered.lock().unwrap().is_empty()
    });
    let batches = delivered.lock().unwrap().clone();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].path, "/solo");
    assert_eq!(batches[0][0].method, "GET");
    assert!(batches[0][0].timestamp.is_some());
    assert_eq!(client.buffer_len(), 0);

    client.shutdown();
}

#[test]
fn reaching_batch_size_flushes_before_the_interval() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, delivered) = capturing();
    let mut cfg = Config::new("ak_test", "https://ingest.example.com/v1/events");
    cfg.storage_path = Some(dir.path().join("events.jsonl"));
    cfg.flush_interval = Duration::from_secs(60);
    cfg.batch_size = 4;
    let client = Client::with_transport(cfg, transport).unwrap();

    for i in 0..4 {
        client.track(event(&format!("/{i}")));
    }

    wait_until(Duration::from_secs(5), || {
        !delivered.lock().unwrap().is_empty()
    });
    let batches = delivered.lock().unwrap().clone();
    assert_eq!(batches[0].len(), 4);
    assert_eq!(batches[0][0].path, "/0");
    assert_eq!(batches[0][3].path, "/3");

    client.shutdown();
}

#[test]
fn explicit_flush_wakes_the_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, delivered) = capturing();
    let mut cfg = Config::new("ak_test", "https://ingest.example.com/v1/events");
    cfg.storage_path = Some(dir.path().join("events.jsonl"));
    cfg.flush_interval = Duration::from_secs(60);
    let client = Client::with_transport(cfg, transport).unwrap();

    client.track(event("/manual"));
    client.flush();

    wait_until(Duration::from_secs(5), || {
        !delivered.lock().unwrap().is_empty()
    });
    assert_eq!(client.buffer_len(), 0);
    client.shutdown();
}

#[test]
fn track_request_fills_consumer_id_from_headers() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, _) = capturing();
    let mut cfg = Config::new("ak_test", "https://ingest.example.com/v1/events");
    cfg.storage_path = Some(dir.path().join("events.jsonl"));
    cfg.flush_interval = Duration::from_secs(60);
    let client = Client::with_transport(cfg, transport).unwrap();

    let mut headers = HashMap::new();
    headers.insert("x-api-key".to_string(), "ak_consumer_9".to_string());
    client.track_request(event("/a"), &headers);

    let mut headers = HashMap::new();
    headers.insert("authorization".to_string(), "Bearer t".to_string());
    client.track_request(event("/b"), &headers);

    // Pre-set consumer ids are left alone
    let mut preset = event("/c");
    preset.consumer_id = Some("explicit".to_string());
    client.track_request(preset, &headers);

    assert_eq!(client.buffer_len(), 3);
    client.shutdown();
}

#[test]
fn identify_consumer_override_replaces_the_default() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, delivered) = capturing();
    let mut cfg = Config::new("ak_test", "https://ingest.example.com/v1/events");
    cfg.storage_path = Some(dir.path().join("events.jsonl"));
    cfg.flush_interval = Duration::from_secs(60);
    cfg.identify_consumer = Some(Box::new(|headers| {
        headers.get("x-tenant").map(|t| format!("tenant:{t}"))
    }));
    let client = Client::with_transport(cfg, transport).unwrap();

    let mut headers = HashMap::new();
    headers.insert("x-tenant".to_string(), "acme".to_string());
    // The default would have picked x-api-key; the override must win
    headers.insert("x-api-key".to_string(), "ak_ignored".to_string());
    client.track_request(event("/t"), &headers);

    client.flush();
    wait_until(Duration::from_secs(5), || {
        !delivered.lock().unwrap().is_empty()
    });
    let batches = delivered.lock().unwrap().clone();
    assert_eq!(batches[0][0].consumer_id.as_deref(), Some("tenant:acme"));

    client.shutdown();
}

#[test]
fn hashed_authorization_reaches_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, delivered) = capturing();
    let mut cfg = Config::new("ak_test", "https://ingest.example.com/v1/events");
    cfg.storage_path = Some(dir.path().join("events.jsonl"));
    cfg.flush_interval = Duration::from_secs(60);
    let client = Client::with_transport(cfg, transport).unwrap();

    let mut headers = HashMap::new();
    headers.insert("authorization".to_string(), "Bearer t".to_string());
    client.track_request(event("/auth"), &headers);

    client.flush();
    wait_until(Duration::from_secs(5), || {
        !delivered.lock().unwrap().is_empty()
    });
    let batches = delivered.lock().unwrap().clone();
    assert_eq!(
        batches[0][0].consumer_id.as_deref(),
        Some(hash_consumer_id("Bearer t").as_str())
    );

    client.shutdown();
}
