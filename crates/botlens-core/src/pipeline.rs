//! Turn pipeline.
//!
//! Middleware run in registration order around a terminal [`TurnHandler`].
//! Each middleware receives a [`Next`] that it may invoke at most once.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use botlens_schema::TurnContext;

/// The bot's own turn logic, run after every middleware.
#[async_trait]
pub trait TurnHandler: Send + Sync {
    async fn handle(&self, context: &mut TurnContext) -> Result<()>;
}

#[async_trait]
pub trait Middleware: Send + Sync {
    /// Middleware name for identification.
    fn name(&self) -> &str;

    async fn on_turn(&self, context: &mut TurnContext, next: Next<'_>) -> Result<()>;
}

/// The rest of the pipeline after the current middleware.
///
/// Consumed by [`Next::run`], so a middleware cannot continue twice.
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Middleware>],
    handler: &'a dyn TurnHandler,
}

impl<'a> Next<'a> {
    pub fn new(remaining: &'a [Arc<dyn Middleware>], handler: &'a dyn TurnHandler) -> Self {
        Self { remaining, handler }
    }

    pub async fn run(self, context: &mut TurnContext) -> Result<()> {
        match self.remaining.split_first() {
            Some((middleware, rest)) => {
                tracing::trace!(middleware = middleware.name(), "entering middleware");
                middleware.on_turn(context, Next::new(rest, self.handler)).await
            }
            None => self.handler.handle(context).await,
        }
    }
}

#[derive(Clone, Default)]
pub struct MiddlewareSet {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        tracing::debug!(middleware = middleware.name(), "registered middleware");
        self.middleware.push(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Runs one turn through every middleware and then `handler`.
    pub async fn run_pipeline(
        &self,
        context: &mut TurnContext,
        handler: &dyn TurnHandler,
    ) -> Result<()> {
        Next::new(&self.middleware, handler).run(context).await
    }
}

impl std::fmt::Debug for MiddlewareSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.middleware.iter().map(|m| m.name()).collect();
        f.debug_struct("MiddlewareSet")
            .field("middleware", &names)
            .finish()
    }
}
