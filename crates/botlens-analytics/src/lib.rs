pub mod text_analytics;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

pub use text_analytics::{TextAnalyticsClient, SUBSCRIPTION_KEY_HEADER};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("text analytics request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("text analytics api error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("text analytics reported errors: {0}")]
    Service(String),
    #[error("text analytics returned no usable document")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedLanguage {
    /// Display name, e.g. `English`.
    pub name: String,
    /// ISO 639-1 code used as input for the later stages.
    pub iso6391_name: String,
}

/// Language detection, key phrase extraction and sentiment scoring.
///
/// Key phrases and sentiment both need the language found by
/// [`TextAnalyzer::detect_language`].
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn detect_language(&self, text: &str) -> Result<DetectedLanguage, AnalysisError>;
    async fn key_phrases(&self, language: &str, text: &str) -> Result<Vec<String>, AnalysisError>;
    async fn sentiment(&self, language: &str, text: &str) -> Result<f64, AnalysisError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    LanguageDetection,
    KeyPhrases,
    Sentiment,
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            AnalysisStage::LanguageDetection => "language detection",
            AnalysisStage::KeyPhrases => "key phrase extraction",
            AnalysisStage::Sentiment => "sentiment scoring",
        };
        f.write_str(stage)
    }
}

/// The stage that stopped the pipeline and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisFailure {
    pub stage: AnalysisStage,
    pub message: String,
}

impl fmt::Display for AnalysisFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)
    }
}

impl std::error::Error for AnalysisFailure {}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub language: Option<String>,
    /// Phrases joined by a single space.
    pub key_phrases: Option<String>,
    pub sentiment: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<AnalysisFailure>,
}

impl AnalysisResult {
    fn stopped_at(mut self, stage: AnalysisStage, err: AnalysisError) -> Self {
        tracing::debug!(%stage, error = %err, "text analysis stopped early");
        self.failure = Some(AnalysisFailure {
            stage,
            message: err.to_string(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.language.is_none() && self.key_phrases.is_none() && self.sentiment.is_none()
    }
}

/// Runs detect -> key phrases -> sentiment, stopping at the first failure.
///
/// Whatever was gathered before the failing stage is kept. A detection
/// result without a name or ISO code ends the pipeline with nothing.
pub async fn evaluate_utterance(analyzer: &dyn TextAnalyzer, text: &str) -> AnalysisResult {
    let result = AnalysisResult::default();

    let detected = match analyzer.detect_language(text).await {
        Ok(detected) if !detected.name.is_empty() && !detected.iso6391_name.is_empty() => detected,
        Ok(_) => return result,
        Err(err) => return result.stopped_at(AnalysisStage::LanguageDetection, err),
    };
    let mut result = AnalysisResult {
        language: Some(detected.name),
        ..result
    };

    match analyzer.key_phrases(&detected.iso6391_name, text).await {
        Ok(phrases) => {
            let joined = phrases.join(" ");
            if !joined.trim().is_empty() {
                result.key_phrases = Some(joined);
            }
        }
        Err(err) => return result.stopped_at(AnalysisStage::KeyPhrases, err),
    }

    match analyzer.sentiment(&detected.iso6391_name, text).await {
        Ok(score) => result.sentiment = Some(score),
        Err(err) => return result.stopped_at(AnalysisStage::Sentiment, err),
    }

    result
}

/// Offline analyzer: always English, long words as key phrases, neutral sentiment.
pub struct StubAnalyzer;

#[async_trait]
impl TextAnalyzer for StubAnalyzer {
    async fn detect_language(&self, text: &str) -> Result<DetectedLanguage, AnalysisError> {
        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }
        Ok(DetectedLanguage {
            name: "English".into(),
            iso6391_name: "en".into(),
        })
    }

    async fn key_phrases(&self, _language: &str, text: &str) -> Result<Vec<String>, AnalysisError> {
        Ok(text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| w.chars().count() >= 5)
            .map(str::to_lowercase)
            .collect())
    }

    async fn sentiment(&self, _language: &str, _text: &str) -> Result<f64, AnalysisError> {
        Ok(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeAnalyzer {
        fail_at: Option<AnalysisStage>,
        language: &'static str,
        phrases: Vec<&'static str>,
    }

    impl FakeAnalyzer {
        fn healthy() -> Self {
            Self {
                fail_at: None,
                language: "English",
                phrases: vec!["flight", "new york"],
            }
        }

        fn failing_at(stage: AnalysisStage) -> Self {
            Self {
                fail_at: Some(stage),
                ..Self::healthy()
            }
        }

        fn check(&self, stage: AnalysisStage) -> Result<(), AnalysisError> {
            if self.fail_at == Some(stage) {
                return Err(AnalysisError::Service(format!("{stage} unavailable")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TextAnalyzer for FakeAnalyzer {
        async fn detect_language(&self, _text: &str) -> Result<DetectedLanguage, AnalysisError> {
            self.check(AnalysisStage::LanguageDetection)?;
            Ok(DetectedLanguage {
                name: self.language.into(),
                iso6391_name: (if self.language.is_empty() { "" } else { "en" }).into(),
            })
        }

        async fn key_phrases(&self, language: &str, _text: &str) -> Result<Vec<String>, AnalysisError> {
            assert_eq!(language, "en");
            self.check(AnalysisStage::KeyPhrases)?;
            Ok(self.phrases.iter().map(|p| p.to_string()).collect())
        }

        async fn sentiment(&self, language: &str, _text: &str) -> Result<f64, AnalysisError> {
            assert_eq!(language, "en");
            self.check(AnalysisStage::Sentiment)?;
            Ok(0.87)
        }
    }

    #[tokio::test]
    async fn full_pipeline_fills_all_fields() {
        let result = evaluate_utterance(&FakeAnalyzer::healthy(), "book a flight to new york").await;
        assert_eq!(result.language.as_deref(), Some("English"));
        assert_eq!(result.key_phrases.as_deref(), Some("flight new york"));
        assert_eq!(result.sentiment, Some(0.87));
        assert!(result.failure.is_none());
    }

    #[tokio::test]
    async fn detection_failure_returns_nothing() {
        let analyzer = FakeAnalyzer::failing_at(AnalysisStage::LanguageDetection);
        let result = evaluate_utterance(&analyzer, "book a flight").await;
        assert!(result.is_empty());
        assert_eq!(
            result.failure.map(|f| f.stage),
            Some(AnalysisStage::LanguageDetection)
        );
    }

    #[tokio::test]
    async fn key_phrase_failure_keeps_language_only() {
        let analyzer = FakeAnalyzer::failing_at(AnalysisStage::KeyPhrases);
        let result = evaluate_utterance(&analyzer, "book a flight").await;
        assert_eq!(result.language.as_deref(), Some("English"));
        assert!(result.key_phrases.is_none());
        assert!(result.sentiment.is_none());
        assert_eq!(result.failure.map(|f| f.stage), Some(AnalysisStage::KeyPhrases));
    }

    #[tokio::test]
    async fn sentiment_failure_keeps_language_and_phrases() {
        let analyzer = FakeAnalyzer::failing_at(AnalysisStage::Sentiment);
        let result = evaluate_utterance(&analyzer, "book a flight").await;
        assert_eq!(result.language.as_deref(), Some("English"));
        assert_eq!(result.key_phrases.as_deref(), Some("flight new york"));
        assert!(result.sentiment.is_none());
        assert_eq!(result.failure.map(|f| f.stage), Some(AnalysisStage::Sentiment));
    }

    #[tokio::test]
    async fn unusable_detection_is_all_absent_without_failure() {
        let analyzer = FakeAnalyzer {
            language: "",
            ..FakeAnalyzer::healthy()
        };
        let result = evaluate_utterance(&analyzer, "???").await;
        assert!(result.is_empty());
        assert!(result.failure.is_none());
    }

    #[tokio::test]
    async fn empty_phrase_list_still_scores_sentiment() {
        let analyzer = FakeAnalyzer {
            phrases: vec![],
            ..FakeAnalyzer::healthy()
        };
        let result = evaluate_utterance(&analyzer, "ok then fine").await;
        assert!(result.key_phrases.is_none());
        assert_eq!(result.sentiment, Some(0.87));
    }

    #[tokio::test]
    async fn stub_analyzer_is_deterministic() {
        let result = evaluate_utterance(&StubAnalyzer, "Please cancel my booking, thanks").await;
        assert_eq!(result.language.as_deref(), Some("English"));
        assert_eq!(result.key_phrases.as_deref(), Some("please cancel booking thanks"));
        assert_eq!(result.sentiment, Some(0.5));
    }
}
