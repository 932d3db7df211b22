//! Event emission abstraction.
//!
//! Scan progress and location changes leave the core through an
//! [`EventSink`], so the core never depends on a particular frontend.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use crate::models::CollectionLocationStatus;
use crate::utils::error::InitializationAdvice;

/// Event name used for every [`ScanEvent`].
pub const SCAN_PROGRESS_EVENT: &str = "scan-progress";

/// Event name used for [`LocationStatusChanged`].
pub const LOCATION_STATUS_EVENT: &str = "location-status-changed";

/// Trait for emitting events to the frontend.
pub trait EventSink: Send + Sync {
    /// Emit an event with the given name and JSON payload.
    ///
    /// # Arguments
    /// * `event_name` - The name of the event (e.g., "scan-progress")
    /// * `payload_json` - JSON-serialized payload string
    fn emit(&self, event_name: &str, payload_json: &str);
}

/// Extension trait for EventSink that provides typed emit functionality.
pub trait EventSinkExt {
    /// Emit an event with a typed payload that will be serialized to JSON.
    fn emit_typed<T: Serialize>(&self, event_name: &str, payload: &T);
}

impl<S: EventSink + ?Sized> EventSinkExt for S {
    fn emit_typed<T: Serialize>(&self, event_name: &str, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(json) => self.emit(event_name, &json),
            Err(e) => {
                tracing::error!("failed to serialize event payload: {}", e);
            }
        }
    }
}

/// Shared reference to an EventSink implementation.
pub type SharedEventSink = Arc<dyn EventSink>;

/// No-op event sink for testing or when events are not needed.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event_name: &str, _payload_json: &str) {}
}

/// Logging event sink for debugging purposes.
#[derive(Debug, Clone, Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, event_name: &str, payload_json: &str) {
        tracing::debug!(event = event_name, payload = payload_json, "event emitted");
    }
}

/// Keeps every emitted event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(String, String)>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(event name, payload json)` pairs in emission order.
    pub fn events(&self) -> Vec<(String, String)> {
        self.events.lock().clone()
    }

    /// Payloads of one event name.
    pub fn payloads(&self, event_name: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(name, _)| name == event_name)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event_name: &str, payload_json: &str) {
        self.events
            .lock()
            .push((event_name.to_string(), payload_json.to_string()));
    }
}

/// Progress reported while the scan worker runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScanEvent {
    #[serde(rename_all = "camelCase")]
    SchemaUpdatesNeeded { steps: usize },
    #[serde(rename_all = "camelCase")]
    SchemaUpdateProgress { message: String, step: usize },
    #[serde(rename_all = "camelCase")]
    InitializationFinished { advice: InitializationAdvice },
    #[serde(rename_all = "camelCase")]
    TotalFilesToScan { count: usize },
    #[serde(rename_all = "camelCase")]
    StartScanningAlbum { album_root: String, album: String },
    #[serde(rename_all = "camelCase")]
    FinishedScanningAlbum { album_root: String, album: String, files: usize },
    #[serde(rename_all = "camelCase")]
    ScannedFiles { count: usize },
    #[serde(rename_all = "camelCase")]
    PartialScanStarted { path: String },
    #[serde(rename_all = "camelCase")]
    PartialScanFinished { path: String },
    #[serde(rename_all = "camelCase")]
    Error { message: String },
    #[serde(rename_all = "camelCase")]
    CompleteScanFinished { errors: Vec<String> },
}

/// Payload of [`LOCATION_STATUS_EVENT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationStatusChanged {
    pub id: i64,
    pub old_status: CollectionLocationStatus,
    pub new_status: CollectionLocationStatus,
}
