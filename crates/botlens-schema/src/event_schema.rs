//! Event and property names understood by the dashboards.
//!
//! Every event the shaper emits is described by an [`EventKind`]; every
//! property key comes from [`Property`]. Tests validate emitted events
//! against [`EventKind::properties`].

use std::fmt;

pub const INTENT_PREFIX: &str = "LuisIntent";
pub const CUSTOM_EVENT_PREFIX: &str = "CustomEvent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Channel,
    FromId,
    FromName,
    ConversationId,
    ConversationName,
    ClientInfo,
    Text,
    Language,
    Sentiment,
    KeyPhrases,
    Intent,
    Score,
    ConfidenceScore,
    Question,
    FoundInKnowledgeSource,
    KnowledgeBasedUsed,
    UserAcceptedAnswer,
    ButtonValue,
    KnowledgeItemsDiscarded,
    QnAResponse,
    ErrorHeadline,
    ErrorData,
}

impl Property {
    pub fn as_str(&self) -> &'static str {
        match self {
            Property::Channel => "Channel",
            Property::FromId => "FromId",
            Property::FromName => "FromName",
            Property::ConversationId => "ConversationId",
            Property::ConversationName => "ConversationName",
            Property::ClientInfo => "ClientInfo",
            Property::Text => "Text",
            Property::Language => "Language",
            Property::Sentiment => "Sentiment",
            Property::KeyPhrases => "KeyPhrases",
            Property::Intent => "Intent",
            Property::Score => "Score",
            Property::ConfidenceScore => "ConfidenceScore",
            Property::Question => "Question",
            Property::FoundInKnowledgeSource => "FoundInKnowledgeSource",
            Property::KnowledgeBasedUsed => "KnowledgeBasedUsed",
            Property::UserAcceptedAnswer => "UserAcceptedAnswer",
            Property::ButtonValue => "ButtonValue",
            Property::KnowledgeItemsDiscarded => "KnowledgeItemsDiscarded",
            Property::QnAResponse => "QnAResponse",
            Property::ErrorHeadline => "ErrorHeadline",
            Property::ErrorData => "ErrorData",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    BotMessageReceived,
    /// One event name per recognized intent, e.g. `LuisIntent.Greeting`.
    Intent(String),
    ButtonPress,
    KbQuestion,
    QnAResponseFound,
    Error,
    NoResponseGiven,
    /// Host-defined event, prefixed so it never collides with the above.
    Custom(String),
}

impl EventKind {
    pub fn name(&self) -> String {
        match self {
            EventKind::BotMessageReceived => "BotMessageReceived".to_string(),
            EventKind::Intent(intent) => format!("{INTENT_PREFIX}.{intent}"),
            EventKind::ButtonPress => "ButtonPress".to_string(),
            EventKind::KbQuestion => "KBQuestion".to_string(),
            EventKind::QnAResponseFound => "QnAResponseFound".to_string(),
            EventKind::Error => "Error".to_string(),
            EventKind::NoResponseGiven => "NoResponseGiven".to_string(),
            EventKind::Custom(name) => format!("{CUSTOM_EVENT_PREFIX}.{name}"),
        }
    }

    /// Schema properties this event may carry before caller overrides.
    ///
    /// `Custom` events are free-form and return an empty list.
    pub fn properties(&self) -> &'static [Property] {
        use Property::*;
        match self {
            EventKind::BotMessageReceived => &[
                Channel,
                FromId,
                ConversationId,
                ConversationName,
                ClientInfo,
                FromName,
                Text,
                Language,
                KeyPhrases,
                Sentiment,
            ],
            EventKind::Intent(_) => &[Intent, Score, ConversationId, Question],
            EventKind::ButtonPress => &[ButtonValue, Intent, ConversationId],
            EventKind::KbQuestion => &[
                Question,
                FoundInKnowledgeSource,
                ConversationId,
                KnowledgeBasedUsed,
                UserAcceptedAnswer,
                KnowledgeItemsDiscarded,
            ],
            EventKind::QnAResponseFound => &[Question, QnAResponse, ConfidenceScore, ConversationId],
            EventKind::Error => &[ErrorHeadline, ConversationId, ErrorData],
            EventKind::NoResponseGiven => &[Question, ConversationId],
            EventKind::Custom(_) => &[],
        }
    }

    pub fn allows(&self, key: &str) -> bool {
        self.properties().iter().any(|p| p.as_str() == key)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
