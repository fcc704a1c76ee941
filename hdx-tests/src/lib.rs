/// Test utilities and helpers for HDX client testing
///
/// Provides ready-made clients over the in-memory engine, a scripted engine
/// for replaying exact completion sequences, and data generators.

use anyhow::{anyhow, Context};
use hdx_client::{
    Attribute, AttributesBuilder, Client, ClientConfig, Completion, Datatype, Engine,
    MemoryEngine, Payload, RawSubmission, Record, Request, RequestId, SpaceSchema, Status, Value,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test-friendly fmt subscriber once per process.
/// Override the level with RUST_LOG, e.g. `RUST_LOG=hdx_client=debug`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(false)
            .try_init();
    });
}

/// `kv`: string key `k`, attributes `v` (string) and `n` (int64)
pub fn kv_space() -> SpaceSchema {
    SpaceSchema::new("kv", "k", Datatype::String)
        .with_attribute("v", Datatype::String)
        .with_attribute("n", Datatype::Int64)
}

/// `profiles`: string key `username` with container attributes
pub fn profiles_space() -> SpaceSchema {
    SpaceSchema::new("profiles", "username", Datatype::String)
        .with_attribute("first", Datatype::String)
        .with_attribute("last", Datatype::String)
        .with_attribute("age", Datatype::Int64)
        .with_attribute("tags", Datatype::set(Datatype::String))
        .with_attribute("history", Datatype::list(Datatype::Int64))
        .with_attribute("scores", Datatype::map(Datatype::String, Datatype::Int64))
}

/// Client over an in-memory engine holding the test spaces
pub struct TestClient {
    pub client: Client,
}

impl TestClient {
    /// Create a client with the default configuration
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client with a custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        init_tracing();
        let engine = MemoryEngine::new()
            .with_space(kv_space())
            .with_space(profiles_space());
        let client = Client::with_config(engine, config).expect("Failed to create client");
        Self { client }
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

#[derive(Default)]
struct Script {
    next_id: i64,
    rejections: VecDeque<(i64, Status)>,
    events: VecDeque<Result<Completion, Status>>,
    submitted: Vec<Request>,
    message: Option<String>,
}

/// Engine that accepts every submission with sequential ids (unless a
/// rejection is queued) and replays scripted events from `pump`
pub struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
}

/// Test-side handle for feeding a `ScriptedEngine`
#[derive(Clone)]
pub struct ScriptHandle {
    script: Arc<Mutex<Script>>,
}

/// Create a scripted engine and its handle
pub fn scripted() -> (ScriptedEngine, ScriptHandle) {
    init_tracing();
    let script = Arc::new(Mutex::new(Script::default()));
    (
        ScriptedEngine {
            script: Arc::clone(&script),
        },
        ScriptHandle { script },
    )
}

impl Engine for ScriptedEngine {
    fn submit(&mut self, request: &Request) -> RawSubmission {
        let mut script = self.script.lock();
        script.submitted.push(request.clone());
        if let Some((raw, status)) = script.rejections.pop_front() {
            return RawSubmission::rejected(raw, status);
        }
        let id = script.next_id;
        script.next_id += 1;
        RawSubmission::accepted(id)
    }

    fn pump(&mut self, _timeout: Option<Duration>) -> Result<Completion, Status> {
        self.script
            .lock()
            .events
            .pop_front()
            .unwrap_or(Err(Status::NonePending))
    }

    fn error_message(&self) -> Option<String> {
        self.script.lock().message.clone()
    }
}

fn request_id(raw: i64) -> RequestId {
    RequestId::new(raw).expect("request ids in scripts are non-negative")
}

impl ScriptHandle {
    /// Reject the next submission with the given raw id and status
    pub fn reject_next(&self, raw: i64, status: Status) {
        self.script.lock().rejections.push_back((raw, status));
    }

    /// Queue a status-only completion
    pub fn complete(&self, id: i64, status: Status) {
        self.push(Ok(Completion::new(request_id(id), status)));
    }

    /// Queue a completion carrying a payload
    pub fn complete_with(&self, id: i64, status: Status, payload: Payload) {
        self.push(Ok(Completion::new(request_id(id), status).with_payload(payload)));
    }

    /// Queue one search row
    pub fn row(&self, id: i64, record: Record) {
        self.complete_with(id, Status::Success, Payload::Record(record));
    }

    /// Queue the terminal event of a search
    pub fn search_done(&self, id: i64) {
        self.complete(id, Status::SearchDone);
    }

    /// Make the next pump fail with `status`
    pub fn fail_loop(&self, status: Status) {
        self.push(Err(status));
    }

    /// Diagnostic returned by `error_message`
    pub fn set_message(&self, message: &str) {
        self.script.lock().message = Some(message.to_string());
    }

    /// Requests submitted so far, including rejected ones
    pub fn submitted(&self) -> Vec<Request> {
        self.script.lock().submitted.clone()
    }

    /// Events queued and not yet pumped
    pub fn queued(&self) -> usize {
        self.script.lock().events.len()
    }

    fn push(&self, event: Result<Completion, Status>) {
        self.script.lock().events.push_back(event);
    }
}

/// Mock data generator for testing
pub struct MockDataGenerator {
    counter: u64,
}

impl MockDataGenerator {
    /// Create a new mock data generator
    pub fn new() -> Self {
        Self { counter: 0 }
    }

    /// Attributes for the `kv` space with the current counter (does not increment)
    pub fn kv_attributes(&self) -> Vec<Attribute> {
        let idx = self.counter;
        AttributesBuilder::new()
            .string("v", format!("value{}", idx))
            .int("n", idx as i64)
            .build()
    }

    /// Generate a simple key
    pub fn simple_key(&mut self) -> String {
        let idx = self.counter;
        self.counter += 1;
        format!("key{:06}", idx)
    }
}

impl Default for MockDataGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a row from `(name, value)` pairs
pub fn record<const N: usize>(fields: [(&str, Value); N]) -> Record {
    fields
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Write `count` objects into `kv`; `n` runs from 0 to count-1
pub fn write_batch(client: &Client, count: usize) -> anyhow::Result<()> {
    let mut gen = MockDataGenerator::new();
    for _ in 0..count {
        let attrs = gen.kv_attributes();
        let key = gen.simple_key();
        let stored = client
            .put("kv", key.as_str(), attrs)
            .with_context(|| format!("put {}", key))?;
        if !stored {
            return Err(anyhow!("put {} reported false", key));
        }
    }
    Ok(())
}

/// Assert that a value is a string with expected contents
pub fn assert_string_eq(value: &Value, expected: &str) {
    match value.as_str() {
        Some(s) => assert_eq!(s, expected),
        None => panic!("Expected string, got {:?}", value),
    }
}

/// Assert that a value is an int64 with expected value
pub fn assert_int_eq(value: &Value, expected: i64) {
    match value.as_int() {
        Some(n) => assert_eq!(n, expected),
        None => panic!("Expected int, got {:?}", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_helper() {
        let test_client = TestClient::new();
        let mut gen = MockDataGenerator::new();

        let attrs = gen.kv_attributes();
        let key = gen.simple_key();

        assert!(test_client.put("kv", key.as_str(), attrs).unwrap());
        let row = test_client.get("kv", key.as_str()).unwrap().unwrap();
        assert_string_eq(&row["v"], "value0");
        assert_int_eq(&row["n"], 0);
    }

    #[test]
    fn test_mock_generator() {
        let mut gen = MockDataGenerator::new();
        let key1 = gen.simple_key();
        let attrs1 = gen.kv_attributes();
        let key2 = gen.simple_key();
        let attrs2 = gen.kv_attributes();

        assert_ne!(key1, key2);
        assert_ne!(attrs1, attrs2);
    }

    #[test]
    fn test_write_batch() {
        let test_client = TestClient::new();
        write_batch(&test_client, 100).unwrap();
        assert_eq!(test_client.count("kv", vec![]).unwrap(), 100);
        assert!(test_client.get("kv", "key000099").unwrap().is_some());
    }

    #[test]
    fn test_scripted_engine_replays() {
        let (engine, script) = scripted();
        let client = Client::new(engine);

        let d = client.async_del("kv", "x").unwrap();
        script.complete(0, Status::NotFound);
        assert!(!d.wait().unwrap());
        assert_eq!(script.submitted().len(), 1);
        assert_eq!(script.queued(), 0);
    }

    #[test]
    fn test_record_helper() {
        let r = record([("a", Value::from(1i64)), ("b", Value::from("x"))]);
        assert_eq!(r.len(), 2);
        assert_int_eq(&r["a"], 1);
    }
}
