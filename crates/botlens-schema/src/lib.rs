pub mod event_schema;
pub mod properties;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use event_schema::{EventKind, Property};
pub use properties::PropertyMap;

/// Key under which an upstream recognizer stores its [`RecognizerResult`].
pub const LUIS_RECOGNIZER_RESULT_KEY: &str = "LuisRecognizerResult";

/// Entity type carrying client details (locale, device, platform).
pub const CLIENT_INFO_ENTITY: &str = "clientInfo";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelAccount {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationAccount {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Loosely typed entity attached to an activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Read-only view of the inbound activity for one turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TurnSnapshot {
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub from: ChannelAccount,
    #[serde(default)]
    pub conversation: ConversationAccount,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl TurnSnapshot {
    pub fn channel_id(&self) -> Option<&str> {
        non_empty(self.channel_id.as_deref())
    }

    pub fn from_id(&self) -> Option<&str> {
        non_empty(self.from.id.as_deref())
    }

    pub fn from_name(&self) -> Option<&str> {
        non_empty(self.from.name.as_deref())
    }

    pub fn conversation_id(&self) -> Option<&str> {
        non_empty(self.conversation.id.as_deref())
    }

    pub fn conversation_name(&self) -> Option<&str> {
        non_empty(self.conversation.name.as_deref())
    }

    pub fn text(&self) -> Option<&str> {
        non_empty(self.text.as_deref())
    }

    /// First `clientInfo` entity that actually carries properties.
    pub fn client_info(&self) -> Option<&serde_json::Value> {
        self.entities
            .iter()
            .find(|entity| entity.kind == CLIENT_INFO_ENTITY)
            .map(|entity| &entity.properties)
            .filter(|props| !props.is_null())
    }
}

/// Treats `Some("")` the same as `None`.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct IntentScore {
    pub score: f64,
}

/// Intent classification produced by an upstream recognizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecognizerResult {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub intents: HashMap<String, IntentScore>,
}

impl RecognizerResult {
    pub fn with_intent(mut self, name: impl Into<String>, score: f64) -> Self {
        self.intents.insert(name.into(), IntentScore { score });
        self
    }

    /// Highest scoring intent. Ties resolve to the lexically smallest name.
    pub fn top_scoring_intent(&self) -> Option<(&str, f64)> {
        self.intents
            .iter()
            .map(|(name, intent)| (name.as_str(), intent.score))
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)))
    }
}

/// Type-erased per-turn service bag populated by upstream middleware.
#[derive(Clone, Default)]
pub struct TurnState {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl TurnState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }
}

impl fmt::Debug for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("TurnState").field("keys", &keys).finish()
    }
}

/// Everything the pipeline knows about the current turn.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    pub activity: TurnSnapshot,
    pub state: TurnState,
}

impl TurnContext {
    pub fn new(activity: TurnSnapshot) -> Self {
        Self {
            activity,
            state: TurnState::new(),
        }
    }

    pub fn with_recognizer_result(mut self, result: RecognizerResult) -> Self {
        self.state.set(LUIS_RECOGNIZER_RESULT_KEY, result);
        self
    }

    pub fn recognizer_result(&self) -> Option<&RecognizerResult> {
        self.state.get::<RecognizerResult>(LUIS_RECOGNIZER_RESULT_KEY)
    }
}

/// A named event with string properties and optional numeric metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryEvent {
    pub name: String,
    pub properties: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<HashMap<String, f64>>,
}

impl TelemetryEvent {
    pub fn new(kind: &EventKind, properties: PropertyMap) -> Self {
        Self {
            name: kind.name(),
            properties: properties.into_inner(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<HashMap<String, f64>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn property(&self, property: Property) -> Option<&str> {
        self.properties.get(property.as_str()).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SeverityLevel {
    Verbose,
    #[default]
    Information,
    Warning,
    Error,
    Critical,
}

impl SeverityLevel {
    /// Numeric level used by the ingestion wire format.
    pub fn as_level(&self) -> u8 {
        match self {
            SeverityLevel::Verbose => 0,
            SeverityLevel::Information => 1,
            SeverityLevel::Warning => 2,
            SeverityLevel::Error => 3,
            SeverityLevel::Critical => 4,
        }
    }
}

/// Scores and sentiment are logged with two decimals.
pub fn format_score(score: f64) -> String {
    format!("{score:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> TurnSnapshot {
        TurnSnapshot {
            channel_id: Some("webchat".into()),
            from: ChannelAccount {
                id: Some("user-1".into()),
                name: Some("".into()),
            },
            conversation: ConversationAccount {
                id: Some("conv-1".into()),
                name: None,
            },
            text: Some("hello there".into()),
            locale: Some("en-US".into()),
            entities: vec![],
        }
    }

    #[test]
    fn empty_strings_read_as_absent() {
        let turn = snapshot();
        assert_eq!(turn.channel_id(), Some("webchat"));
        assert_eq!(turn.from_name(), None);
        assert_eq!(turn.conversation_name(), None);
    }

    #[test]
    fn client_info_picks_first_entity_with_properties() {
        let mut turn = snapshot();
        turn.entities = vec![
            Entity {
                kind: "mention".into(),
                properties: serde_json::json!({"text": "@bot"}),
            },
            Entity {
                kind: CLIENT_INFO_ENTITY.into(),
                properties: serde_json::json!({"locale": "en-GB", "platform": "ios"}),
            },
        ];
        let info = turn.client_info().unwrap();
        assert_eq!(info["platform"], "ios");
    }

    #[test]
    fn client_info_ignores_null_properties() {
        let mut turn = snapshot();
        turn.entities = vec![Entity {
            kind: CLIENT_INFO_ENTITY.into(),
            properties: serde_json::Value::Null,
        }];
        assert!(turn.client_info().is_none());
    }

    #[test]
    fn snapshot_deserializes_from_activity_json() {
        let raw = serde_json::json!({
            "channelId": "msteams",
            "from": {"id": "u1", "name": "Ada"},
            "conversation": {"id": "c1"},
            "text": "book a flight",
            "entities": [{"type": "clientInfo", "properties": {"locale": "en-US"}}]
        });
        let turn: TurnSnapshot = serde_json::from_value(raw).unwrap();
        assert_eq!(turn.channel_id(), Some("msteams"));
        assert_eq!(turn.from_name(), Some("Ada"));
        assert!(turn.client_info().is_some());
    }

    #[test]
    fn top_scoring_intent_picks_highest() {
        let result = RecognizerResult::default()
            .with_intent("Greeting", 0.91)
            .with_intent("Cancel", 0.12)
            .with_intent("None", 0.05);
        assert_eq!(result.top_scoring_intent(), Some(("Greeting", 0.91)));
    }

    #[test]
    fn top_scoring_intent_empty_is_none() {
        assert!(RecognizerResult::default().top_scoring_intent().is_none());
    }

    #[test]
    fn turn_state_round_trips_typed_values() {
        let ctx = TurnContext::new(snapshot())
            .with_recognizer_result(RecognizerResult::default().with_intent("Help", 0.7));
        assert!(ctx.state.contains(LUIS_RECOGNIZER_RESULT_KEY));
        assert_eq!(
            ctx.recognizer_result().unwrap().top_scoring_intent(),
            Some(("Help", 0.7))
        );
        // Wrong type under the right key is not a recognizer result.
        let mut other = TurnContext::new(snapshot());
        other.state.set(LUIS_RECOGNIZER_RESULT_KEY, "not a result".to_string());
        assert!(other.recognizer_result().is_none());
    }

    #[test]
    fn format_score_uses_two_decimals() {
        assert_eq!(format_score(0.87), "0.87");
        assert_eq!(format_score(0.5), "0.50");
        assert_eq!(format_score(0.876), "0.88");
    }
}
