use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use botlens_schema::TurnContext;
use futures::FutureExt;

use crate::error::TelemetryError;
use crate::pipeline::{Middleware, Next};
use crate::telemetry::TurnTelemetry;

/// Logs every inbound turn, and its recognized intent, before the bot runs.
///
/// Telemetry failures are reported and swallowed. The rest of the
/// pipeline runs exactly once whatever happens here.
pub struct ConversationalTelemetryMiddleware {
    telemetry: Arc<TurnTelemetry>,
}

impl ConversationalTelemetryMiddleware {
    pub fn new(telemetry: Arc<TurnTelemetry>) -> Self {
        Self { telemetry }
    }

    pub fn telemetry(&self) -> &Arc<TurnTelemetry> {
        &self.telemetry
    }

    async fn log_turn(&self, context: &TurnContext) -> Result<(), TelemetryError> {
        self.telemetry.log_incoming_message(context, None).await?;
        if context.recognizer_result().is_some() {
            self.telemetry.log_intent(context, None).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Middleware for ConversationalTelemetryMiddleware {
    fn name(&self) -> &str {
        "conversational_telemetry"
    }

    async fn on_turn(&self, context: &mut TurnContext, next: Next<'_>) -> Result<()> {
        let outcome = AssertUnwindSafe(self.log_turn(context)).catch_unwind().await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(anyhow::Error::new(err)),
            Err(_) => Some(anyhow::Error::new(TelemetryError::Panicked(
                "turn telemetry panicked".to_string(),
            ))),
        };

        if let Some(err) = failure {
            tracing::warn!(error = %err, "turn telemetry failed, continuing pipeline");
            let reported = AssertUnwindSafe(self.telemetry.track_exception(&err, None, None))
                .catch_unwind()
                .await;
            if !matches!(reported, Ok(Ok(()))) {
                tracing::debug!("could not report turn telemetry failure");
            }
        }

        next.run(context).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use botlens_analytics::StubAnalyzer;
    use botlens_schema::{
        ChannelAccount, ConversationAccount, RecognizerResult, TurnSnapshot,
    };

    use super::*;
    use crate::config::TelemetryConfig;
    use crate::pipeline::{MiddlewareSet, TurnHandler};
    use crate::sink::MemorySink;

    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TurnHandler for CountingHandler {
        async fn handle(&self, _context: &mut TurnContext) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pipeline(sink: Arc<MemorySink>) -> MiddlewareSet {
        let config = TelemetryConfig::new("ikey", "ta-key", "https://ta.example.com").unwrap();
        let telemetry =
            TurnTelemetry::with_analyzer(config, sink, Arc::new(StubAnalyzer)).unwrap();
        let mut set = MiddlewareSet::new();
        set.use_middleware(Arc::new(ConversationalTelemetryMiddleware::new(Arc::new(
            telemetry,
        ))));
        set
    }

    fn turn(text: &str) -> TurnContext {
        TurnContext::new(TurnSnapshot {
            channel_id: Some("webchat".into()),
            from: ChannelAccount {
                id: Some("user-1".into()),
                name: Some("Ada".into()),
            },
            conversation: ConversationAccount {
                id: Some("conv-1".into()),
                name: None,
            },
            text: Some(text.into()),
            ..TurnSnapshot::default()
        })
    }

    #[tokio::test]
    async fn logs_message_then_continues() {
        let sink = Arc::new(MemorySink::new());
        let set = pipeline(sink.clone());
        let handler = CountingHandler {
            calls: AtomicUsize::new(0),
        };

        let mut ctx = turn("hi");
        set.run_pipeline(&mut ctx, &handler).await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "BotMessageReceived");
    }

    #[tokio::test]
    async fn logs_intent_when_recognized() {
        let sink = Arc::new(MemorySink::new());
        let set = pipeline(sink.clone());
        let handler = CountingHandler {
            calls: AtomicUsize::new(0),
        };

        let mut ctx = turn("hello there bot")
            .with_recognizer_result(RecognizerResult::default().with_intent("Greeting", 0.91));
        set.run_pipeline(&mut ctx, &handler).await.unwrap();

        let names: Vec<String> = sink.events().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["BotMessageReceived", "LuisIntent.Greeting"]);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }
}
