//! Shapes conversational telemetry events.
//!
//! Every public operation builds a flat string property map, optionally
//! enriches it with text analysis, and hands one event to the sink.
//! Failures past argument validation are reported to the sink and
//! swallowed so telemetry can never fail a bot turn.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use botlens_analytics::{
    evaluate_utterance, AnalysisFailure, AnalysisResult, AnalysisStage, TextAnalyticsClient,
    TextAnalyzer,
};
use botlens_schema::{
    format_score, EventKind, Property, PropertyMap, SeverityLevel, TelemetryEvent, TurnContext,
};
use futures::FutureExt;

use crate::client::TelemetryClient;
use crate::config::TelemetryConfig;
use crate::error::{ensure_not_empty, TelemetryError};
use crate::sink::{TelemetryContext, TelemetrySink};

pub struct TurnTelemetry {
    config: TelemetryConfig,
    sink: Arc<dyn TelemetrySink>,
    analyzer: Arc<dyn TextAnalyzer>,
}

impl TurnTelemetry {
    /// Validates `config` and talks to the configured Text Analytics endpoint.
    pub fn new(config: TelemetryConfig, sink: Arc<dyn TelemetrySink>) -> Result<Self, TelemetryError> {
        config.validate()?;
        let analyzer = Arc::new(TextAnalyticsClient::new(
            config.text_analytics_key.clone(),
            config.text_analytics_endpoint.clone(),
        ));
        Ok(Self {
            config,
            sink,
            analyzer,
        })
    }

    pub fn with_analyzer(
        config: TelemetryConfig,
        sink: Arc<dyn TelemetrySink>,
        analyzer: Arc<dyn TextAnalyzer>,
    ) -> Result<Self, TelemetryError> {
        config.validate()?;
        Ok(Self {
            config,
            sink,
            analyzer,
        })
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Logs a `BotMessageReceived` event for the inbound activity.
    ///
    /// Channel, sender, conversation and client info are always logged
    /// when present. Sender name, raw text and text analysis follow the
    /// configuration toggles. Caller properties are applied last and win
    /// over any field of the same name.
    pub async fn log_incoming_message(
        &self,
        turn: &TurnContext,
        additional_properties: Option<&HashMap<String, String>>,
    ) -> Result<(), TelemetryError> {
        let activity = &turn.activity;
        let context = turn_identity(turn);

        self.run_and_report("log_incoming_message", context, |tc| async move {
            let mut properties = PropertyMap::new();
            properties
                .insert_if_present(Property::Channel, activity.channel_id())
                .insert_if_present(Property::FromId, activity.from_id())
                .insert_if_present(Property::ConversationId, activity.conversation_id())
                .insert_if_present(Property::ConversationName, activity.conversation_name());

            if let Some(client_info) = activity.client_info() {
                properties.insert(Property::ClientInfo, client_info.to_string());
            }
            if self.config.log_user_name {
                properties.insert_if_present(Property::FromName, activity.from_name());
            }
            if self.config.log_original_messages {
                properties.insert_if_present(Property::Text, activity.text());
            }
            if let Some(text) = activity.text().filter(|_| self.config.analysis_enabled()) {
                self.add_text_analysis(&tc, text, &mut properties).await;
            }
            properties.overlay(additional_properties);

            tc.track_event(TelemetryEvent::new(&EventKind::BotMessageReceived, properties))
                .await
        })
        .await;
        Ok(())
    }

    /// Logs `LuisIntent.<intent>` for the top scoring recognized intent.
    ///
    /// Does nothing when no recognizer result is attached to the turn or
    /// its top intent has no name.
    pub async fn log_intent(
        &self,
        turn: &TurnContext,
        additional_properties: Option<&HashMap<String, String>>,
    ) -> Result<(), TelemetryError> {
        let Some(result) = turn.recognizer_result() else {
            return Ok(());
        };
        let Some((intent, score)) = result
            .top_scoring_intent()
            .filter(|(intent, _)| !intent.is_empty())
        else {
            tracing::debug!("recognizer result carries no named intent, skipping intent event");
            return Ok(());
        };
        let activity = &turn.activity;

        self.run_and_report("log_intent", turn_identity(turn), |tc| async move {
            let mut properties = PropertyMap::new();
            properties
                .insert(Property::Intent, intent)
                .insert(Property::Score, format_score(score))
                .insert_if_present(Property::ConversationId, activity.conversation_id());

            if self.config.log_original_messages {
                properties.insert_if_present(Property::Question, activity.text());
            }
            properties.overlay(additional_properties);

            let kind = EventKind::Intent(intent.to_string());
            tc.track_event(TelemetryEvent::new(&kind, properties)).await
        })
        .await;
        Ok(())
    }

    /// Logs a `ButtonPress` (card action) event.
    pub async fn log_button_press(
        &self,
        conversation_id: Option<&str>,
        button_value: &str,
        intent: Option<&str>,
        additional_properties: Option<&HashMap<String, String>>,
    ) -> Result<(), TelemetryError> {
        ensure_not_empty(button_value, "buttonValue must be set")?;

        let mut properties = PropertyMap::new();
        properties
            .insert(Property::ButtonValue, button_value)
            .insert_if_present(Property::Intent, intent)
            .insert_if_present(Property::ConversationId, conversation_id)
            .overlay(additional_properties);

        self.emit("log_button_press", EventKind::ButtonPress, properties)
            .await;
        Ok(())
    }

    /// Logs a `KBQuestion` event for a question some knowledge source answered.
    pub async fn log_knowledge_found_for_unknown_question(
        &self,
        turn: &TurnContext,
        knowledge_base_used: Option<&str>,
        user_accepted: Option<bool>,
    ) -> Result<(), TelemetryError> {
        let activity = &turn.activity;
        let mut properties = PropertyMap::new();
        properties
            .insert_if_present(Property::Question, activity.text())
            .insert(Property::FoundInKnowledgeSource, bool_label(true))
            .insert_if_present(Property::ConversationId, activity.conversation_id())
            .insert_if_present(Property::KnowledgeBasedUsed, knowledge_base_used);
        if let Some(accepted) = user_accepted {
            properties.insert(Property::UserAcceptedAnswer, bool_label(accepted));
        }

        self.emit_with_context(
            "log_knowledge_found_for_unknown_question",
            turn_identity(turn),
            EventKind::KbQuestion,
            properties,
        )
        .await;
        Ok(())
    }

    /// Logs a `KBQuestion` event for a question no knowledge source could answer.
    ///
    /// `items_excluded` (e.g. low scoring candidates) is rendered as
    /// `key=value, key=value`.
    pub async fn log_no_knowledge_for_unknown_question(
        &self,
        turn: &TurnContext,
        knowledge_base_used: Option<&str>,
        items_excluded: Option<&HashMap<String, String>>,
    ) -> Result<(), TelemetryError> {
        let activity = &turn.activity;
        let mut properties = PropertyMap::new();
        properties
            .insert_if_present(Property::Question, activity.text())
            .insert(Property::FoundInKnowledgeSource, bool_label(false))
            .insert_if_present(Property::ConversationId, activity.conversation_id())
            .insert_if_present(Property::KnowledgeBasedUsed, knowledge_base_used)
            .insert_items(Property::KnowledgeItemsDiscarded, items_excluded);

        self.emit_with_context(
            "log_no_knowledge_for_unknown_question",
            turn_identity(turn),
            EventKind::KbQuestion,
            properties,
        )
        .await;
        Ok(())
    }

    pub async fn log_qna_response_found(
        &self,
        conversation_id: Option<&str>,
        question: &str,
        qna_response: &str,
        confidence_score: f64,
    ) -> Result<(), TelemetryError> {
        ensure_not_empty(question, "question must be set")?;
        ensure_not_empty(qna_response, "qnaResponse must be set")?;

        let mut properties = PropertyMap::new();
        properties
            .insert(Property::Question, question)
            .insert(Property::QnAResponse, qna_response)
            .insert(Property::ConfidenceScore, format_score(confidence_score))
            .insert_if_present(Property::ConversationId, conversation_id);

        self.emit("log_qna_response_found", EventKind::QnAResponseFound, properties)
            .await;
        Ok(())
    }

    /// Logs an `Error` event with a headline and optional extra data.
    pub async fn log_error(
        &self,
        error_headline: &str,
        conversation_id: Option<&str>,
        extra_data: Option<&HashMap<String, String>>,
    ) -> Result<(), TelemetryError> {
        ensure_not_empty(error_headline, "errorHeadline must be set")?;

        let mut properties = PropertyMap::new();
        properties
            .insert(Property::ErrorHeadline, error_headline)
            .insert_if_present(Property::ConversationId, conversation_id)
            .insert_items(Property::ErrorData, extra_data);

        self.emit("log_error", EventKind::Error, properties).await;
        Ok(())
    }

    pub async fn log_no_response_given(
        &self,
        conversation_id: Option<&str>,
        question: &str,
    ) -> Result<(), TelemetryError> {
        ensure_not_empty(question, "question must be set")?;

        let mut properties = PropertyMap::new();
        properties
            .insert(Property::Question, question)
            .insert_if_present(Property::ConversationId, conversation_id);

        self.emit("log_no_response_given", EventKind::NoResponseGiven, properties)
            .await;
        Ok(())
    }

    /// Logs a host defined event as `CustomEvent.<name>`.
    pub async fn track_event(
        &self,
        event_name: &str,
        properties: Option<HashMap<String, String>>,
        metrics: Option<HashMap<String, f64>>,
    ) -> Result<(), TelemetryError> {
        ensure_not_empty(event_name, "eventName must be set")?;

        let kind = EventKind::Custom(event_name.to_string());
        let event = TelemetryEvent::new(&kind, properties.unwrap_or_default().into())
            .with_metrics(metrics);
        self.run_and_report("track_event", TelemetryContext::new(), |tc| async move {
            tc.track_event(event).await
        })
        .await;
        Ok(())
    }

    pub async fn trace(
        &self,
        message: &str,
        severity: SeverityLevel,
        properties: Option<HashMap<String, String>>,
    ) -> Result<(), TelemetryError> {
        ensure_not_empty(message, "traceString must be set")?;

        self.run_and_report("trace", TelemetryContext::new(), |tc| async move {
            tc.track_trace(message, severity, properties).await
        })
        .await;
        Ok(())
    }

    pub async fn track_exception(
        &self,
        error: &anyhow::Error,
        properties: Option<HashMap<String, String>>,
        metrics: Option<HashMap<String, f64>>,
    ) -> Result<(), TelemetryError> {
        self.run_and_report("track_exception", TelemetryContext::new(), |tc| async move {
            tc.track_exception(error, properties, metrics).await
        })
        .await;
        Ok(())
    }

    async fn emit(&self, label: &str, kind: EventKind, properties: PropertyMap) {
        self.emit_with_context(label, TelemetryContext::new(), kind, properties)
            .await
    }

    async fn emit_with_context(
        &self,
        label: &str,
        context: TelemetryContext,
        kind: EventKind,
        properties: PropertyMap,
    ) {
        self.run_and_report(label, context, |tc| async move {
            tc.track_event(TelemetryEvent::new(&kind, properties)).await
        })
        .await
    }

    /// Runs `op` with a fresh client and reports any error or panic once.
    ///
    /// If reporting fails too, the failure is only written to the log.
    async fn run_and_report<F, Fut>(&self, label: &str, context: TelemetryContext, op: F)
    where
        F: FnOnce(TelemetryClient) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<()>> + Send,
    {
        let client = TelemetryClient::new(self.sink.clone(), context);
        let op_client = client.clone();
        let outcome = AssertUnwindSafe(async move { op(op_client).await })
            .catch_unwind()
            .await;

        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err,
            Err(panic) => anyhow::Error::new(TelemetryError::Panicked(panic_message(panic.as_ref()))),
        };
        tracing::warn!(operation = label, error = %format!("{error:#}"), "telemetry operation failed");

        let report = AssertUnwindSafe(client.track_exception(&error, None, None))
            .catch_unwind()
            .await;
        match report {
            Ok(Ok(())) => {}
            Ok(Err(report_err)) => {
                tracing::debug!(operation = label, error = %report_err, "dropping unreportable telemetry failure");
            }
            Err(_) => {
                tracing::debug!(operation = label, "telemetry sink panicked while reporting a failure");
            }
        }
    }

    /// Adds language, key phrases and sentiment for long enough utterances.
    ///
    /// Words are counted by splitting the raw text on single spaces.
    async fn add_text_analysis(&self, tc: &TelemetryClient, text: &str, properties: &mut PropertyMap) {
        let word_count = text.split(' ').count();
        if word_count < self.config.sentiment_word_threshold {
            let message = format!(
                "log_incoming_message: no sentiment calculated for an utterance with {word_count} word(s)"
            );
            best_effort(tc.track_trace(&message, SeverityLevel::Information, None).await);
            return;
        }

        let analysis = AssertUnwindSafe(evaluate_utterance(self.analyzer.as_ref(), text))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| AnalysisResult {
                failure: Some(AnalysisFailure {
                    stage: AnalysisStage::LanguageDetection,
                    message: format!("analyzer panicked: {}", panic_message(panic.as_ref())),
                }),
                ..AnalysisResult::default()
            });

        if let Some(failure) = &analysis.failure {
            let error = anyhow::Error::new(failure.clone());
            best_effort(tc.track_exception(&error, None, None).await);
            let message = format!(
                "exception occurred whilst calculating sentiment, logging without it: {failure}"
            );
            best_effort(tc.track_trace(&message, SeverityLevel::Warning, None).await);
        }

        properties
            .insert_if_present(Property::Language, analysis.language.as_deref())
            .insert_if_present(Property::KeyPhrases, analysis.key_phrases.as_deref());
        if let Some(sentiment) = analysis.sentiment {
            properties.insert(Property::Sentiment, format_score(sentiment));
        }
    }
}

/// Session and user identity for items tied to a turn.
fn turn_identity(turn: &TurnContext) -> TelemetryContext {
    TelemetryContext::new()
        .with_session(turn.activity.conversation_id())
        .with_user(turn.activity.from_id())
}

fn bool_label(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn best_effort(result: anyhow::Result<()>) {
    if let Err(err) = result {
        tracing::debug!(error = %err, "dropping diagnostic telemetry");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_labels_match_dashboard_values() {
        assert_eq!(bool_label(true), "True");
        assert_eq!(bool_label(false), "False");
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
