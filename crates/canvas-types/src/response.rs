//! Inbound response envelopes from the completion service.
//!
//! Every frame is a JSON object with a mandatory `type` tag and optional
//! `payload` / `content` fields whose shape depends on the tag. Decoding
//! into [`ResponseEnvelope`] fails for unknown tags.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseEnvelope {
    /// Partial completion text.
    #[serde(rename = "completion.chunk")]
    CompletionChunk(ResponseBody),
    /// Final completion text.
    #[serde(rename = "completion.response")]
    CompletionResponse(ResponseBody),
    /// Token usage; always the last frame of a cycle.
    #[serde(rename = "completion.usage")]
    CompletionUsage(ResponseBody),
    /// Retrieved source nodes backing the completion.
    #[serde(rename = "completion.sources")]
    CompletionSources(ResponseBody),
    /// Human-in-the-loop request.
    #[serde(rename = "completion.hitl.request")]
    HitlRequest(ResponseBody),
    /// Workflow progress notification.
    #[serde(rename = "event")]
    Event(ResponseBody),
    /// Service-side failure.
    #[serde(rename = "error")]
    Error(ResponseBody),
    /// Request accepted.
    #[serde(rename = "confirmation")]
    Confirmation(ResponseBody),
}

/// Fields shared by every envelope variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

/// Usage summary carried by `completion.usage`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageInfo {
    #[serde(default)]
    pub generated_tokens: u64,
    #[serde(default, rename = "traceId")]
    pub trace_id: Option<String>,
    #[serde(default, rename = "traceUrl")]
    pub trace_url: Option<String>,
}

impl ResponseEnvelope {
    /// The wire tag of this envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseEnvelope::CompletionChunk(_) => "completion.chunk",
            ResponseEnvelope::CompletionResponse(_) => "completion.response",
            ResponseEnvelope::CompletionUsage(_) => "completion.usage",
            ResponseEnvelope::CompletionSources(_) => "completion.sources",
            ResponseEnvelope::HitlRequest(_) => "completion.hitl.request",
            ResponseEnvelope::Event(_) => "event",
            ResponseEnvelope::Error(_) => "error",
            ResponseEnvelope::Confirmation(_) => "confirmation",
        }
    }

    pub fn body(&self) -> &ResponseBody {
        match self {
            ResponseEnvelope::CompletionChunk(b)
            | ResponseEnvelope::CompletionResponse(b)
            | ResponseEnvelope::CompletionUsage(b)
            | ResponseEnvelope::CompletionSources(b)
            | ResponseEnvelope::HitlRequest(b)
            | ResponseEnvelope::Event(b)
            | ResponseEnvelope::Error(b)
            | ResponseEnvelope::Confirmation(b) => b,
        }
    }
}

impl ResponseBody {
    /// `content` as text. Numbers are rendered, `null` and objects yield `None`.
    pub fn text(&self) -> Option<String> {
        match self.content.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// `payload.description` when it is a string.
    pub fn description(&self) -> Option<&str> {
        self.payload.as_ref()?.get("description")?.as_str()
    }

    /// `payload.payload.artifactId`, accepting string or numeric ids.
    pub fn artifact_id(&self) -> Option<String> {
        let id = self.payload.as_ref()?.get("payload")?.get("artifactId")?;
        match id {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Usage summary, when the payload has the expected shape.
    pub fn usage(&self) -> Option<UsageInfo> {
        serde_json::from_value(self.payload.clone()?).ok()
    }

    /// Human-readable error text from `content` or `payload.error`.
    pub fn error_message(&self) -> Option<String> {
        self.text().or_else(|| {
            self.payload
                .as_ref()?
                .get("error")?
                .as_str()
                .map(str::to_string)
        })
    }
}
