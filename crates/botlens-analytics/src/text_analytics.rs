//! Cognitive Services Text Analytics (v2.0) client
//!
//! Each stage is a single-document batch call authenticated with a
//! subscription key header.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, DetectedLanguage, TextAnalyzer};

pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

const API_PATH: &str = "text/analytics/v2.0";
const DOCUMENT_ID: &str = "1";

#[derive(Debug, Clone)]
pub struct TextAnalyticsClient {
    client: reqwest::Client,
    pub(crate) subscription_key: String,
    pub(crate) endpoint: String,
}

impl TextAnalyticsClient {
    pub fn new(subscription_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            subscription_key: subscription_key.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, operation: &str) -> String {
        format!("{}/{}/{}", self.endpoint, API_PATH, operation)
    }

    async fn post<B, R>(&self, operation: &str, body: &B) -> Result<R, AnalysisError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp = self
            .client
            .post(self.url(operation))
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json::<R>().await?)
    }

    fn multi_language(language: &str, text: &str) -> MultiLanguageBatchInput {
        MultiLanguageBatchInput {
            documents: vec![MultiLanguageInput {
                language: language.to_string(),
                id: DOCUMENT_ID.to_string(),
                text: text.to_string(),
            }],
        }
    }
}

#[async_trait]
impl TextAnalyzer for TextAnalyticsClient {
    async fn detect_language(&self, text: &str) -> Result<DetectedLanguage, AnalysisError> {
        let input = LanguageBatchInput {
            documents: vec![LanguageInput {
                id: DOCUMENT_ID.to_string(),
                text: text.to_string(),
            }],
        };
        let batch: LanguageBatchResult = self.post("languages", &input).await?;
        ensure_no_errors(&batch.errors)?;

        batch
            .documents
            .into_iter()
            .next()
            .and_then(|doc| doc.detected_languages.into_iter().next())
            .map(|lang| DetectedLanguage {
                name: lang.name,
                iso6391_name: lang.iso6391_name,
            })
            .ok_or(AnalysisError::EmptyResponse)
    }

    async fn key_phrases(&self, language: &str, text: &str) -> Result<Vec<String>, AnalysisError> {
        let input = Self::multi_language(language, text);
        let batch: KeyPhraseBatchResult = self.post("keyPhrases", &input).await?;
        ensure_no_errors(&batch.errors)?;

        batch
            .documents
            .into_iter()
            .next()
            .map(|doc| doc.key_phrases)
            .ok_or(AnalysisError::EmptyResponse)
    }

    async fn sentiment(&self, language: &str, text: &str) -> Result<f64, AnalysisError> {
        let input = Self::multi_language(language, text);
        let batch: SentimentBatchResult = self.post("sentiment", &input).await?;
        ensure_no_errors(&batch.errors)?;

        batch
            .documents
            .into_iter()
            .next()
            .and_then(|doc| doc.score)
            .ok_or(AnalysisError::EmptyResponse)
    }
}

fn ensure_no_errors(errors: &[DocumentError]) -> Result<(), AnalysisError> {
    if errors.is_empty() {
        return Ok(());
    }
    let message = errors
        .iter()
        .map(|e| format!("{}: {}", e.id, e.message))
        .collect::<Vec<_>>()
        .join("; ");
    Err(AnalysisError::Service(message))
}

// ============================================================
// Wire types
// ============================================================

#[derive(Debug, Serialize)]
struct LanguageBatchInput {
    documents: Vec<LanguageInput>,
}

#[derive(Debug, Serialize)]
struct LanguageInput {
    id: String,
    text: String,
}

#[derive(Debug, Serialize)]
struct MultiLanguageBatchInput {
    documents: Vec<MultiLanguageInput>,
}

#[derive(Debug, Serialize)]
struct MultiLanguageInput {
    language: String,
    id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct DocumentError {
    #[serde(default)]
    id: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct LanguageBatchResult {
    #[serde(default)]
    documents: Vec<LanguageDocument>,
    #[serde(default)]
    errors: Vec<DocumentError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LanguageDocument {
    #[serde(default)]
    detected_languages: Vec<DetectedLanguageRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectedLanguageRecord {
    #[serde(default)]
    name: String,
    #[serde(default)]
    iso6391_name: String,
}

#[derive(Debug, Deserialize)]
struct KeyPhraseBatchResult {
    #[serde(default)]
    documents: Vec<KeyPhraseDocument>,
    #[serde(default)]
    errors: Vec<DocumentError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyPhraseDocument {
    #[serde(default)]
    key_phrases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SentimentBatchResult {
    #[serde(default)]
    documents: Vec<SentimentDocument>,
    #[serde(default)]
    errors: Vec<DocumentError>,
}

#[derive(Debug, Deserialize)]
struct SentimentDocument {
    #[serde(default)]
    score: Option<f64>,
}
