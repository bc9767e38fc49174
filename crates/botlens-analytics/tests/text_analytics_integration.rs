use botlens_analytics::{
    evaluate_utterance, AnalysisError, AnalysisStage, TextAnalyticsClient, TextAnalyzer,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "test-subscription-key";

async fn mount_languages(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/text/analytics/v2.0/languages"))
        .and(header("Ocp-Apim-Subscription-Key", KEY))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "documents": [{
                "id": "1",
                "detectedLanguages": [{"name": "English", "iso6391Name": "en", "score": 1.0}]
            }],
            "errors": []
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_key_phrases(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/text/analytics/v2.0/keyPhrases"))
        .and(header("Ocp-Apim-Subscription-Key", KEY))
        .and(body_partial_json(serde_json::json!({
            "documents": [{"language": "en", "id": "1"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "documents": [{"id": "1", "keyPhrases": ["flight", "Seattle"]}],
            "errors": []
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn full_pipeline_against_mock_service() {
    let server = MockServer::start().await;
    mount_languages(&server).await;
    mount_key_phrases(&server).await;
    Mock::given(method("POST"))
        .and(path("/text/analytics/v2.0/sentiment"))
        .and(header("Ocp-Apim-Subscription-Key", KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "documents": [{"id": "1", "score": 0.9312}],
            "errors": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = TextAnalyticsClient::new(KEY, server.uri());
    let result = evaluate_utterance(&client, "I need a flight to Seattle").await;

    assert_eq!(result.language.as_deref(), Some("English"));
    assert_eq!(result.key_phrases.as_deref(), Some("flight Seattle"));
    assert_eq!(result.sentiment, Some(0.9312));
    assert!(result.failure.is_none());
}

#[tokio::test]
async fn sentiment_outage_keeps_earlier_stages() {
    let server = MockServer::start().await;
    mount_languages(&server).await;
    mount_key_phrases(&server).await;
    Mock::given(method("POST"))
        .and(path("/text/analytics/v2.0/sentiment"))
        .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
        .mount(&server)
        .await;

    let client = TextAnalyticsClient::new(KEY, server.uri());
    let result = evaluate_utterance(&client, "I need a flight to Seattle").await;

    assert_eq!(result.language.as_deref(), Some("English"));
    assert_eq!(result.key_phrases.as_deref(), Some("flight Seattle"));
    assert!(result.sentiment.is_none());
    let failure = result.failure.unwrap();
    assert_eq!(failure.stage, AnalysisStage::Sentiment);
    assert!(failure.message.contains("503"));
}

#[tokio::test]
async fn document_errors_stop_at_detection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/text/analytics/v2.0/languages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "documents": [],
            "errors": [{"id": "1", "message": "Document text is empty."}]
        })))
        .mount(&server)
        .await;

    let client = TextAnalyticsClient::new(KEY, server.uri());
    let result = evaluate_utterance(&client, "   ").await;

    assert!(result.is_empty());
    assert_eq!(
        result.failure.map(|f| f.stage),
        Some(AnalysisStage::LanguageDetection)
    );
}

#[tokio::test]
async fn rejected_key_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/text/analytics/v2.0/languages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"code": "401", "message": "Access denied due to invalid subscription key."}
        })))
        .mount(&server)
        .await;

    let client = TextAnalyticsClient::new("wrong-key", server.uri());
    let err = client.detect_language("hello there friend").await.unwrap_err();
    match err {
        AnalysisError::Status { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("invalid subscription key"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_score_is_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/text/analytics/v2.0/sentiment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "documents": [{"id": "1"}],
            "errors": []
        })))
        .mount(&server)
        .await;

    let client = TextAnalyticsClient::new(KEY, server.uri());
    let err = client.sentiment("en", "fine thanks").await.unwrap_err();
    assert!(matches!(err, AnalysisError::EmptyResponse));
}
