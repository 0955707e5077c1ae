use std::time::Duration;

use serde_json::{Map, Value};

use crate::client::Client;
use crate::config::Config;

/// Routes log output of the crate to the test harness.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub(crate) fn client(uri: &str) -> Client {
    init_tracing();
    Config::new("test-token")
        .with_api_url(uri)
        .with_poll_interval(Duration::from_millis(5))
        .with_wait_timeout(Duration::from_secs(2))
        .with_import_timeout(Duration::from_secs(2))
        .client()
        .unwrap()
}

pub(crate) fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}
