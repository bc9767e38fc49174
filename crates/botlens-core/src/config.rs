use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

pub const DEFAULT_SENTIMENT_WORD_THRESHOLD: usize = 3;
pub const DEFAULT_INGESTION_ENDPOINT: &str = "https://dc.services.visualstudio.com";

fn default_true() -> bool {
    true
}

fn default_sentiment_word_threshold() -> usize {
    DEFAULT_SENTIMENT_WORD_THRESHOLD
}

fn default_ingestion_endpoint() -> String {
    DEFAULT_INGESTION_ENDPOINT.to_string()
}

/// Settings fixed at construction time.
///
/// The three credentials are required; the toggles default to on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub app_insights_key: String,
    #[serde(default)]
    pub text_analytics_key: String,
    #[serde(default)]
    pub text_analytics_endpoint: String,
    /// Include raw utterance / question text in events.
    #[serde(default = "default_true")]
    pub log_original_messages: bool,
    /// Include the sender's display name.
    #[serde(default = "default_true")]
    pub log_user_name: bool,
    #[serde(default = "default_true")]
    pub log_sentiment_and_key_phrases: bool,
    /// Utterances with fewer words skip text analysis.
    #[serde(default = "default_sentiment_word_threshold")]
    pub sentiment_word_threshold: usize,
    #[serde(default = "default_ingestion_endpoint")]
    pub ingestion_endpoint: String,
}

impl TelemetryConfig {
    pub fn new(
        app_insights_key: impl Into<String>,
        text_analytics_key: impl Into<String>,
        text_analytics_endpoint: impl Into<String>,
    ) -> Result<Self, TelemetryError> {
        let config = Self {
            app_insights_key: app_insights_key.into(),
            text_analytics_key: text_analytics_key.into(),
            text_analytics_endpoint: text_analytics_endpoint.into(),
            log_original_messages: true,
            log_user_name: true,
            log_sentiment_and_key_phrases: true,
            sentiment_word_threshold: DEFAULT_SENTIMENT_WORD_THRESHOLD,
            ingestion_endpoint: default_ingestion_endpoint(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_log_original_messages(mut self, enabled: bool) -> Self {
        self.log_original_messages = enabled;
        self
    }

    pub fn with_log_user_name(mut self, enabled: bool) -> Self {
        self.log_user_name = enabled;
        self
    }

    pub fn with_log_sentiment_and_key_phrases(mut self, enabled: bool) -> Self {
        self.log_sentiment_and_key_phrases = enabled;
        self
    }

    pub fn with_sentiment_word_threshold(mut self, threshold: usize) -> Self {
        self.sentiment_word_threshold = threshold;
        self
    }

    pub fn with_ingestion_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.ingestion_endpoint = endpoint.into();
        self
    }

    pub fn validate(&self) -> Result<(), TelemetryError> {
        let required = [
            ("app_insights_key", &self.app_insights_key),
            ("text_analytics_key", &self.text_analytics_key),
            ("text_analytics_endpoint", &self.text_analytics_endpoint),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(TelemetryError::MissingConfig { field });
            }
        }
        Ok(())
    }

    /// Text analysis runs only when enabled and a key is configured.
    pub fn analysis_enabled(&self) -> bool {
        self.log_sentiment_and_key_phrases && !self.text_analytics_key.is_empty()
    }
}

/// Expands `${NAME}` placeholders from the environment.
///
/// Unset variables expand to an empty string; an unclosed `${` is kept
/// verbatim.
pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                output.push_str(&std::env::var(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                output.push_str(&rest[start..]);
                return output;
            }
        }
    }

    output.push_str(rest);
    output
}

pub fn load_config(path: &Path) -> Result<TelemetryConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let mut config: TelemetryConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))?;

    resolve_config_env(&mut config);
    config
        .validate()
        .with_context(|| format!("invalid telemetry config: {}", path.display()))?;
    Ok(config)
}

fn resolve_config_env(config: &mut TelemetryConfig) {
    config.app_insights_key = resolve_env_var(&config.app_insights_key);
    config.text_analytics_key = resolve_env_var(&config.text_analytics_key);
    config.text_analytics_endpoint = resolve_env_var(&config.text_analytics_endpoint);
    config.ingestion_endpoint = resolve_env_var(&config.ingestion_endpoint);
}
