//! Chat message types.
//!
//! A conversation is an ordered history of messages plus the single assistant
//! message currently being streamed into. Progress events reported by the
//! completion service hang off that in-flight message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{now_ms, HighlightedText};

/// A chat message from the user, the assistant or the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent this message
    pub role: ChatRole,
    /// Message text (may be partial during streaming)
    pub message: String,
    /// Progress events reported while the message was produced
    #[serde(default)]
    pub events: Vec<ChatMessageEvent>,
    /// Context items attached by the user
    #[serde(default)]
    pub context: Vec<ContextItem>,
    /// Message timestamp (ms since Unix epoch)
    pub timestamp: u64,
}

/// Role of the message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

/// Kind of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Progress,
    Done,
    Error,
}

/// A progress notification attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageEvent {
    #[serde(rename = "type")]
    pub kind: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl ChatMessageEvent {
    /// A `progress` event with a human-readable label.
    pub fn progress(label: impl Into<String>) -> Self {
        Self {
            kind: EventType::Progress,
            label: Some(label.into()),
            content: None,
        }
    }
}

/// A piece of context the user attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: Value,
}

/// The message currently being composed by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    pub value: String,
    #[serde(default)]
    pub context: Vec<ContextItem>,
    /// Text highlighted in the editor when the message was composed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlighted: Option<HighlightedText>,
}

impl ChatMessage {
    /// Create a new user message.
    pub fn user(message: impl Into<String>, context: Vec<ContextItem>) -> Self {
        Self {
            role: ChatRole::User,
            message: message.into(),
            events: Vec::new(),
            context,
            timestamp: now_ms(),
        }
    }

    /// Create an empty assistant message to stream into.
    pub fn assistant() -> Self {
        Self {
            role: ChatRole::Assistant,
            message: String::new(),
            events: Vec::new(),
            context: Vec::new(),
            timestamp: now_ms(),
        }
    }
}
