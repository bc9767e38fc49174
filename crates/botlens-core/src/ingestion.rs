//! Application Insights compatible ingestion sink.
//!
//! https://learn.microsoft.com/azure/azure-monitor/app/api-custom-events-metrics

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use botlens_schema::{SeverityLevel, TelemetryEvent};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;

use crate::error::TelemetryError;
use crate::sink::{ExceptionRecord, TelemetryContext, TelemetrySink};

const TRACK_PATH: &str = "v2/track";

#[derive(Debug, Clone)]
pub struct IngestionSink {
    client: reqwest::Client,
    pub(crate) instrumentation_key: String,
    pub(crate) endpoint: String,
}

impl IngestionSink {
    pub fn new(instrumentation_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            instrumentation_key: instrumentation_key.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    fn envelope(
        &self,
        context: &TelemetryContext,
        item: &'static str,
        base_type: &'static str,
        base_data: serde_json::Value,
    ) -> Envelope<'_> {
        let mut tags = HashMap::new();
        tags.insert("ai.operation.id", context.operation_id.to_string());
        if let Some(session_id) = &context.session_id {
            tags.insert("ai.session.id", session_id.clone());
        }
        if let Some(user_id) = &context.user_id {
            tags.insert("ai.user.id", user_id.clone());
        }

        Envelope {
            name: item,
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ikey: &self.instrumentation_key,
            tags,
            data: EnvelopeData {
                base_type,
                base_data,
            },
        }
    }

    async fn send(&self, envelope: Envelope<'_>) -> Result<()> {
        let url = format!("{}/{}", self.endpoint, TRACK_PATH);
        let resp = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(&[envelope])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TelemetryError::Sink(format!("ingestion returned {status}: {body}")).into());
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for IngestionSink {
    async fn track_event(&self, context: &TelemetryContext, event: TelemetryEvent) -> Result<()> {
        let base_data = json!({
            "ver": 2,
            "name": event.name,
            "properties": event.properties,
            "measurements": event.metrics.unwrap_or_default(),
        });
        let envelope = self.envelope(
            context,
            "Microsoft.ApplicationInsights.Event",
            "EventData",
            base_data,
        );
        self.send(envelope).await
    }

    async fn track_trace(
        &self,
        context: &TelemetryContext,
        message: &str,
        severity: SeverityLevel,
        properties: Option<HashMap<String, String>>,
    ) -> Result<()> {
        let base_data = json!({
            "ver": 2,
            "message": message,
            "severityLevel": severity.as_level(),
            "properties": properties.unwrap_or_default(),
        });
        let envelope = self.envelope(
            context,
            "Microsoft.ApplicationInsights.Message",
            "MessageData",
            base_data,
        );
        self.send(envelope).await
    }

    async fn track_exception(
        &self,
        context: &TelemetryContext,
        exception: ExceptionRecord,
    ) -> Result<()> {
        let base_data = json!({
            "ver": 2,
            "exceptions": [{
                "typeName": exception.type_name,
                "message": exception.message,
                "hasFullStack": false,
            }],
            "properties": exception.properties.unwrap_or_default(),
            "measurements": exception.metrics.unwrap_or_default(),
        });
        let envelope = self.envelope(
            context,
            "Microsoft.ApplicationInsights.Exception",
            "ExceptionData",
            base_data,
        );
        self.send(envelope).await
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    name: &'static str,
    time: String,
    #[serde(rename = "iKey")]
    ikey: &'a str,
    tags: HashMap<&'static str, String>,
    data: EnvelopeData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeData {
    base_type: &'static str,
    base_data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_trims_trailing_slash() {
        let sink = IngestionSink::new("ikey", "https://dc.services.visualstudio.com/");
        assert_eq!(sink.endpoint, "https://dc.services.visualstudio.com");
        assert_eq!(sink.instrumentation_key, "ikey");
    }

    #[test]
    fn envelope_carries_identity_tags() {
        let sink = IngestionSink::new("ikey", "https://example.com");
        let ctx = TelemetryContext::new()
            .with_session(Some("conv-1"))
            .with_user(Some("user-1"));
        let envelope = sink.envelope(
            &ctx,
            "Microsoft.ApplicationInsights.Event",
            "EventData",
            json!({"name": "BotMessageReceived"}),
        );
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["iKey"], "ikey");
        assert_eq!(value["tags"]["ai.session.id"], "conv-1");
        assert_eq!(value["tags"]["ai.user.id"], "user-1");
        assert_eq!(value["tags"]["ai.operation.id"], ctx.operation_id.to_string());
        assert_eq!(value["data"]["baseType"], "EventData");
        assert_eq!(value["data"]["baseData"]["name"], "BotMessageReceived");
    }

    #[test]
    fn envelope_omits_missing_identity() {
        let sink = IngestionSink::new("ikey", "https://example.com");
        let envelope = sink.envelope(
            &TelemetryContext::new(),
            "Microsoft.ApplicationInsights.Message",
            "MessageData",
            json!({}),
        );
        assert!(!envelope.tags.contains_key("ai.session.id"));
        assert!(!envelope.tags.contains_key("ai.user.id"));
    }
}
