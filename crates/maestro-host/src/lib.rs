//! The host command layer, seen from the editor side.
//!
//! The surrounding application exposes named operations (persist an entry,
//! list models from a remote endpoint, manage files) over its own IPC. The
//! editors only ever need "invoke a named remote operation with arguments
//! and receive a typed result or error", so that is the whole capability
//! surface here. Persistence calls are fire-and-forget: the editors update
//! in-memory state first and never block on the host.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Operation names understood by the host process.
pub mod ops {
    pub const SAVE_PROVIDER_ENTRY: &str = "save_provider_entry";
    pub const SAVE_REGISTRY: &str = "save_registry";
    pub const SAVE_SETTINGS: &str = "save_settings";
    pub const LIST_REMOTE_MODELS: &str = "list_remote_models";
}

#[async_trait]
pub trait HostCommands: Send + Sync {
    async fn invoke(&self, operation: &str, args: Value) -> anyhow::Result<Value>;
}

/// Fire-and-forget invoke: failures are logged, never propagated.
pub fn spawn_invoke(host: Arc<dyn HostCommands>, operation: &'static str, args: Value) {
    tokio::spawn(async move {
        if let Err(e) = host.invoke(operation, args).await {
            tracing::warn!(operation, error = %e, "host command failed");
        }
    });
}

/// In-memory host double that records every invocation. Test-only in
/// spirit, but exported so downstream crates can use it in their tests.
#[derive(Default)]
pub struct RecordingHost {
    calls: std::sync::Mutex<Vec<(String, Value)>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().expect("recording host lock").clone()
    }
}

#[async_trait]
impl HostCommands for RecordingHost {
    async fn invoke(&self, operation: &str, args: Value) -> anyhow::Result<Value> {
        self.calls
            .lock()
            .expect("recording host lock")
            .push((operation.to_string(), args));
        Ok(Value::Null)
    }
}
