use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use botlens_core::{MiddlewareSet, TurnHandler};
use botlens_schema::{RecognizerResult, TurnContext, TurnSnapshot};
use serde::Deserialize;

/// One line of a replay file.
#[derive(Debug, Deserialize)]
pub struct ReplayTurn {
    pub activity: TurnSnapshot,
    #[serde(default)]
    pub recognizer_result: Option<RecognizerResult>,
}

impl ReplayTurn {
    pub fn into_context(self) -> TurnContext {
        let context = TurnContext::new(self.activity);
        match self.recognizer_result {
            Some(result) => context.with_recognizer_result(result),
            None => context,
        }
    }
}

/// Parses JSON lines, skipping blank lines and `#` comments.
pub fn parse_turns(content: &str) -> Result<Vec<ReplayTurn>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid turn on line {}", idx + 1))
        })
        .collect()
}

pub fn load_turns(path: &Path) -> Result<Vec<ReplayTurn>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read turns file: {}", path.display()))?;
    parse_turns(&content)
}

/// Stands in for the bot: logs what reached it.
pub struct EchoHandler;

#[async_trait]
impl TurnHandler for EchoHandler {
    async fn handle(&self, context: &mut TurnContext) -> Result<()> {
        tracing::info!(
            conversation = context.activity.conversation_id().unwrap_or("-"),
            text = context.activity.text().unwrap_or(""),
            "turn reached bot"
        );
        Ok(())
    }
}

pub async fn replay(pipeline: &MiddlewareSet, turns: Vec<ReplayTurn>) -> Result<usize> {
    let mut replayed = 0;
    for turn in turns {
        let mut context = turn.into_context();
        pipeline.run_pipeline(&mut context, &EchoHandler).await?;
        replayed += 1;
    }
    Ok(replayed)
}
