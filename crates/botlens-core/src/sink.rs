//! Destinations for telemetry items.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use botlens_schema::{SeverityLevel, TelemetryEvent};
use serde::Serialize;
use uuid::Uuid;

/// Identity stamped on every item emitted by one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryContext {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub operation_id: Uuid,
}

impl TelemetryContext {
    pub fn new() -> Self {
        Self {
            session_id: None,
            user_id: None,
            operation_id: Uuid::new_v4(),
        }
    }

    pub fn with_session(mut self, session_id: Option<&str>) -> Self {
        self.session_id = session_id.filter(|s| !s.is_empty()).map(str::to_string);
        self
    }

    pub fn with_user(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.filter(|s| !s.is_empty()).map(str::to_string);
        self
    }
}

impl Default for TelemetryContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A caught failure, flattened for the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionRecord {
    pub type_name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<HashMap<String, f64>>,
}

impl ExceptionRecord {
    pub fn from_error(error: &anyhow::Error) -> Self {
        let type_name = match error.downcast_ref::<crate::error::TelemetryError>() {
            Some(_) => "TelemetryError",
            None if error.is::<botlens_analytics::AnalysisFailure>() => "AnalysisFailure",
            None => "Error",
        };
        Self {
            type_name: type_name.to_string(),
            message: format!("{error:#}"),
            properties: None,
            metrics: None,
        }
    }

    pub fn with_properties(mut self, properties: Option<HashMap<String, String>>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<HashMap<String, f64>>) -> Self {
        self.metrics = metrics;
        self
    }
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn track_event(&self, context: &TelemetryContext, event: TelemetryEvent) -> Result<()>;

    async fn track_trace(
        &self,
        context: &TelemetryContext,
        message: &str,
        severity: SeverityLevel,
        properties: Option<HashMap<String, String>>,
    ) -> Result<()>;

    async fn track_exception(
        &self,
        context: &TelemetryContext,
        exception: ExceptionRecord,
    ) -> Result<()>;
}

/// One recorded item, as seen by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryItem {
    Event {
        context: TelemetryContext,
        event: TelemetryEvent,
    },
    Trace {
        context: TelemetryContext,
        message: String,
        severity: SeverityLevel,
        properties: Option<HashMap<String, String>>,
    },
    Exception {
        context: TelemetryContext,
        exception: ExceptionRecord,
    },
}

impl TelemetryItem {
    pub fn context(&self) -> &TelemetryContext {
        match self {
            TelemetryItem::Event { context, .. }
            | TelemetryItem::Trace { context, .. }
            | TelemetryItem::Exception { context, .. } => context,
        }
    }
}

/// Keeps every item in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    items: Mutex<Vec<TelemetryItem>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<TelemetryItem> {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.items()
            .into_iter()
            .filter_map(|item| match item {
                TelemetryItem::Event { event, .. } => Some(event),
                _ => None,
            })
            .collect()
    }

    pub fn traces(&self) -> Vec<String> {
        self.items()
            .into_iter()
            .filter_map(|item| match item {
                TelemetryItem::Trace { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn exceptions(&self) -> Vec<ExceptionRecord> {
        self.items()
            .into_iter()
            .filter_map(|item| match item {
                TelemetryItem::Exception { exception, .. } => Some(exception),
                _ => None,
            })
            .collect()
    }

    fn push(&self, item: TelemetryItem) -> Result<()> {
        self.items
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink poisoned"))?
            .push(item);
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn track_event(&self, context: &TelemetryContext, event: TelemetryEvent) -> Result<()> {
        self.push(TelemetryItem::Event {
            context: context.clone(),
            event,
        })
    }

    async fn track_trace(
        &self,
        context: &TelemetryContext,
        message: &str,
        severity: SeverityLevel,
        properties: Option<HashMap<String, String>>,
    ) -> Result<()> {
        self.push(TelemetryItem::Trace {
            context: context.clone(),
            message: message.to_string(),
            severity,
            properties,
        })
    }

    async fn track_exception(
        &self,
        context: &TelemetryContext,
        exception: ExceptionRecord,
    ) -> Result<()> {
        self.push(TelemetryItem::Exception {
            context: context.clone(),
            exception,
        })
    }
}

/// Writes items as structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl TelemetrySink for TracingSink {
    async fn track_event(&self, context: &TelemetryContext, event: TelemetryEvent) -> Result<()> {
        let properties = serde_json::to_string(&event.properties)?;
        tracing::info!(
            target: "botlens::telemetry",
            event = %event.name,
            session_id = context.session_id.as_deref().unwrap_or(""),
            user_id = context.user_id.as_deref().unwrap_or(""),
            operation_id = %context.operation_id,
            %properties,
            "event"
        );
        Ok(())
    }

    async fn track_trace(
        &self,
        context: &TelemetryContext,
        message: &str,
        severity: SeverityLevel,
        properties: Option<HashMap<String, String>>,
    ) -> Result<()> {
        let properties = serde_json::to_string(&properties.unwrap_or_default())?;
        tracing::info!(
            target: "botlens::telemetry",
            severity = ?severity,
            session_id = context.session_id.as_deref().unwrap_or(""),
            user_id = context.user_id.as_deref().unwrap_or(""),
            operation_id = %context.operation_id,
            %properties,
            "trace: {message}"
        );
        Ok(())
    }

    async fn track_exception(
        &self,
        context: &TelemetryContext,
        exception: ExceptionRecord,
    ) -> Result<()> {
        tracing::warn!(
            target: "botlens::telemetry",
            type_name = %exception.type_name,
            operation_id = %context.operation_id,
            "exception: {}",
            exception.message
        );
        Ok(())
    }
}
