//! Conversation Messages
//!
//! The data model shared by every part of the assistant: stored turns,
//! citations, the provider-facing history shape, and the notifications sent
//! from the engine to whatever surface renders the conversation.
//!
//! # Design Philosophy
//!
//! The engine owns the conversation; surfaces (terminal, web view, tests) are
//! pure renderers that display what they are told. A surface never mutates a
//! [`Message`] directly. It receives [`AssistantMessage`] notifications and
//! reads the log through the store.

use serde::{Deserialize, Serialize};

/// Who authored a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Citizen input
    User,
    /// Assistant response
    Bot,
}

/// A source reference surfaced by the assistant
///
/// Identity is the `uri`; two citations with the same `uri` are the same
/// citation regardless of title.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Human-readable source title
    pub title: String,
    /// Link to the source
    pub uri: String,
}

impl Citation {
    /// Create a citation
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uri: uri.into(),
        }
    }
}

/// One conversational turn
///
/// Serialized as `{"role": "user" | "bot", "text": ..., "citations": [...]}`.
/// `citations` is omitted entirely when no citation was ever found.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who authored the turn
    pub role: Role,
    /// Raw text, possibly containing inline markup
    pub text: String,
    /// Sources backing a bot turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
}

impl Message {
    /// Create a user turn
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            citations: None,
        }
    }

    /// Create a bot turn without citations
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            text: text.into(),
            citations: None,
        }
    }

    /// Append a streamed fragment
    pub fn append(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Whether the turn carries at least one citation
    #[must_use]
    pub fn has_citations(&self) -> bool {
        self.citations.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// Role names the completion provider understands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    /// A user turn
    User,
    /// A bot turn
    Model,
}

/// One text part of a history turn
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPart {
    /// The part text
    pub text: String,
}

/// A prior turn reduced to the provider's `{role, parts: [{text}]}` shape
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    /// Provider role
    pub role: HistoryRole,
    /// Text parts (always exactly one for stored turns)
    pub parts: Vec<HistoryPart>,
}

impl HistoryTurn {
    /// Build a single-part turn
    pub fn new(role: HistoryRole, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![HistoryPart { text: text.into() }],
        }
    }
}

impl From<&Message> for HistoryTurn {
    fn from(message: &Message) -> Self {
        let role = match message.role {
            Role::User => HistoryRole::User,
            Role::Bot => HistoryRole::Model,
        };
        Self::new(role, message.text.clone())
    }
}

/// Message-exchange states
///
/// `Finalized` and `Failed` are terminal for one exchange; the engine accepts
/// a new submission from either of them just as from `Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeState {
    /// No request outstanding
    Idle,
    /// User turn stored, waiting for the first chunk
    Sending,
    /// Bot turn is growing chunk by chunk
    Streaming,
    /// Provider ended the stream normally
    Finalized,
    /// Provider rejected or the stream broke
    Failed,
}

impl ExchangeState {
    /// Whether a request is outstanding (input must stay disabled)
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }

    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle | Self::Finalized | Self::Failed => "Ready",
            Self::Sending => "መልስ በማዘጋጀት ላይ...",
            Self::Streaming => "Responding...",
        }
    }
}

/// Notifications from the engine to a rendering surface
///
/// Indices refer to positions in the conversation log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssistantMessage {
    /// The exchange state changed
    State {
        /// The new state
        state: ExchangeState,
    },

    /// A new turn was appended to the log
    TurnAppended {
        /// Position of the new turn
        index: usize,
        /// The appended turn
        message: Message,
    },

    /// The in-flight bot turn grew
    TurnUpdated {
        /// Position of the turn
        index: usize,
        /// Full text after the latest chunk
        text: String,
    },

    /// The bot turn was finalized
    TurnFinalized {
        /// Position of the turn
        index: usize,
        /// Citations attached to the turn
        citations: Option<Vec<Citation>>,
    },

    /// History was cleared back to the welcome message
    Cleared,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_without_citations_omits_field() {
        let json = serde_json::to_string(&Message::bot("hi")).unwrap();
        assert_eq!(json, r#"{"role":"bot","text":"hi"}"#);
    }

    #[test]
    fn test_message_with_citations_round_trip() {
        let mut msg = Message::bot("answer");
        msg.citations = Some(vec![Citation::new("Proclamation", "https://mor.gov.et")]);

        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
        assert!(back.has_citations());
    }

    #[test]
    fn test_history_turn_from_message() {
        let user = HistoryTurn::from(&Message::user("ጥያቄ"));
        assert_eq!(user.role, HistoryRole::User);
        assert_eq!(user.parts[0].text, "ጥያቄ");

        let bot = HistoryTurn::from(&Message::bot("መልስ"));
        assert_eq!(bot.role, HistoryRole::Model);

        let json = serde_json::to_value(&bot).unwrap();
        assert_eq!(json["role"], "model");
        assert_eq!(json["parts"][0]["text"], "መልስ");
    }

    #[test]
    fn test_exchange_state_in_flight() {
        assert!(ExchangeState::Sending.is_in_flight());
        assert!(ExchangeState::Streaming.is_in_flight());
        assert!(!ExchangeState::Idle.is_in_flight());
        assert!(!ExchangeState::Finalized.is_in_flight());
        assert!(!ExchangeState::Failed.is_in_flight());
        assert_eq!(ExchangeState::Idle.description(), "Ready");
    }
}
