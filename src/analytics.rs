//! Product analytics events
//!
//! Views capture events through an injected [`EventSink`]. Capturing never
//! returns errors and never blocks the caller. Frontends that exit after a
//! run call [`EventSink::flush`] so queued events still go out.

use crate::config::{AnalyticsConfig, DEFAULT_ANALYTICS_PROJECT};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;

/// How an image reached the upload zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMethod {
    DragDrop,
    FilePicker,
}

impl UploadMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DragDrop => "drag_drop",
            Self::FilePicker => "file_picker",
        }
    }
}

/// One analytics event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    pub name: String,
    pub properties: BTreeMap<String, Value>,
}

impl AnalyticsEvent {
    /// Event tagged with the default project
    pub fn new<S: Into<String>>(name: S) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(
            "project".to_string(),
            Value::from(DEFAULT_ANALYTICS_PROJECT),
        );
        Self {
            name: name.into(),
            properties,
        }
    }

    #[must_use]
    pub fn with_property<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    #[must_use]
    pub fn image_uploaded(file_type: &str, file_size: usize, method: UploadMethod) -> Self {
        Self::new("image_uploaded")
            .with_property("file_type", file_type)
            .with_property("file_size", file_size as u64)
            .with_property("upload_method", method.as_str())
    }

    #[must_use]
    pub fn image_result_viewed(processing_time_ms: u64) -> Self {
        Self::new("image_result_viewed").with_property("processing_time", processing_time_ms)
    }

    #[must_use]
    pub fn comparison_slider_used() -> Self {
        Self::new("comparison_slider_used")
    }

    #[must_use]
    pub fn image_downloaded(format: &str) -> Self {
        Self::new("image_downloaded").with_property("format", format)
    }

    #[must_use]
    pub fn process_new_image_clicked() -> Self {
        Self::new("process_new_image_clicked")
    }
}

/// Destination of analytics events
#[async_trait]
pub trait EventSink: Send + Sync {
    fn capture(&self, event: AnalyticsEvent);

    /// Wait up to `timeout` for events still in flight
    async fn flush(&self, _timeout: Duration) {}
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn capture(&self, _event: AnalyticsEvent) {}
}

/// Emits events as `tracing` records
#[derive(Debug, Clone)]
pub struct TracingSink {
    project: String,
}

impl Default for TracingSink {
    fn default() -> Self {
        Self {
            project: DEFAULT_ANALYTICS_PROJECT.to_string(),
        }
    }
}

impl TracingSink {
    #[must_use]
    pub fn with_project<S: Into<String>>(mut self, project: S) -> Self {
        self.project = project.into();
        self
    }
}

impl EventSink for TracingSink {
    fn capture(&self, event: AnalyticsEvent) {
        let event = event.with_property("project", self.project.as_str());
        let properties = serde_json::to_string(&event.properties).unwrap_or_default();
        tracing::info!(
            target: "nobg::analytics",
            event = %event.name,
            properties = %properties,
            "Analytics event"
        );
    }
}

#[derive(Serialize)]
struct CaptureBody<'a> {
    api_key: &'a str,
    event: &'a str,
    properties: &'a BTreeMap<String, Value>,
    timestamp: String,
}

/// Posts events as JSON to a capture endpoint
///
/// Each event is sent from its own task. Failed sends are logged at debug
/// level; [`EventSink::flush`] waits for the tasks still running.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    project: String,
    in_flight: Arc<Mutex<JoinSet<()>>>,
}

impl HttpSink {
    pub fn new<E: Into<String>>(endpoint: E, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.unwrap_or_default(),
            project: DEFAULT_ANALYTICS_PROJECT.to_string(),
            in_flight: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Override the project tag attached to events
    #[must_use]
    pub fn with_project<S: Into<String>>(mut self, project: S) -> Self {
        self.project = project.into();
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventSink for HttpSink {
    fn capture(&self, event: AnalyticsEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(event = %event.name, "No async runtime, analytics event dropped");
            return;
        };

        let event = event.with_property("project", self.project.as_str());
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let api_key = self.api_key.clone();

        let send = async move {
            let body = CaptureBody {
                api_key: &api_key,
                event: &event.name,
                properties: &event.properties,
                timestamp: chrono::Utc::now().to_rfc3339(),
            };

            match client.post(&endpoint).json(&body).send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::debug!(
                        event = %event.name,
                        status = %response.status(),
                        "Analytics endpoint rejected event"
                    );
                },
                Ok(_) => {},
                Err(e) => {
                    tracing::debug!(event = %event.name, error = %e, "Failed to send analytics event");
                },
            }
        };

        match self.in_flight.lock() {
            Ok(mut tasks) => {
                tasks.spawn_on(send, &runtime);
            },
            Err(_) => {
                runtime.spawn(send);
            },
        }
    }

    async fn flush(&self, timeout: Duration) {
        let mut tasks = {
            let Ok(mut in_flight) = self.in_flight.lock() else {
                return;
            };
            std::mem::take(&mut *in_flight)
        };
        if tasks.is_empty() {
            return;
        }
        tracing::debug!(pending = tasks.len(), "Flushing analytics events");

        let drained = tokio::time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::debug!(
                remaining = tasks.len(),
                "Analytics flush timed out, dropping unsent events"
            );
        }
    }
}

/// Build the sink described by `config`
///
/// Disabled analytics yields [`NoOpSink`]; enabled without an endpoint logs
/// events through [`TracingSink`].
#[must_use]
pub fn sink_from_config(config: &AnalyticsConfig) -> Arc<dyn EventSink> {
    if !config.enabled {
        return Arc::new(NoOpSink);
    }
    match &config.endpoint {
        Some(endpoint) => Arc::new(
            HttpSink::new(endpoint.clone(), config.api_key.clone())
                .with_project(config.project.clone()),
        ),
        None => Arc::new(TracingSink::default().with_project(config.project.clone())),
    }
}

/// Records events in memory, for tests
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<AnalyticsEvent>>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.name).collect()
    }
}

impl EventSink for RecordingSink {
    fn capture(&self, event: AnalyticsEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
