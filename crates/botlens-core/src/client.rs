use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use botlens_schema::{SeverityLevel, TelemetryEvent};

use crate::sink::{ExceptionRecord, TelemetryContext, TelemetrySink};

/// A sink bound to one identity context.
///
/// Built fresh for every logical operation, so nothing leaks between turns.
#[derive(Clone)]
pub struct TelemetryClient {
    sink: Arc<dyn TelemetrySink>,
    context: TelemetryContext,
}

impl TelemetryClient {
    pub fn new(sink: Arc<dyn TelemetrySink>, context: TelemetryContext) -> Self {
        Self { sink, context }
    }

    pub fn context(&self) -> &TelemetryContext {
        &self.context
    }

    pub async fn track_event(&self, event: TelemetryEvent) -> Result<()> {
        self.sink.track_event(&self.context, event).await
    }

    pub async fn track_trace(
        &self,
        message: &str,
        severity: SeverityLevel,
        properties: Option<HashMap<String, String>>,
    ) -> Result<()> {
        self.sink
            .track_trace(&self.context, message, severity, properties)
            .await
    }

    pub async fn track_exception(
        &self,
        error: &anyhow::Error,
        properties: Option<HashMap<String, String>>,
        metrics: Option<HashMap<String, f64>>,
    ) -> Result<()> {
        let record = ExceptionRecord::from_error(error)
            .with_properties(properties)
            .with_metrics(metrics);
        self.sink.track_exception(&self.context, record).await
    }
}

impl std::fmt::Debug for TelemetryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryClient")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
