//! Outbound chat completion request.
//!
//! One request is sent per cycle as a single JSON text frame. Keys are
//! camelCase on the wire and absent optionals are omitted entirely.

use serde::{Deserialize, Serialize};

use crate::ChatRole;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionRequest {
    pub message: String,
    pub chat_history: Vec<HistoryTurn>,
    pub knowledge: Vec<KnowledgeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlighted_text: Option<HighlightedText>,
    /// Present only when the open document has content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_length: Option<ArtifactLength>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_comments: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_logs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_bugs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_search_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_cutoff: Option<f32>,
}

/// A prior conversation turn as sent to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Kind of knowledge store a source refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KnowledgeKind {
    VectorStore,
    DocumentStore,
}

/// A knowledge source the service should retrieve from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSource {
    #[serde(rename = "type")]
    pub kind: KnowledgeKind,
    pub id: String,
    /// Backend client name ("qdrant", "mongodb", ...)
    pub client: String,
}

impl KnowledgeSource {
    pub fn vector_store(id: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            kind: KnowledgeKind::VectorStore,
            id: id.into(),
            client: client.into(),
        }
    }
}

/// Text the user highlighted in the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightedText {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: HighlightKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightKind {
    Code,
    #[default]
    Markdown,
    Plain,
}

/// Reference to the document the conversation is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: String,
    pub content: String,
}

/// Proposed length of a generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactLength {
    Short,
    Medium,
    Long,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_camel_case_and_omits_absent_fields() {
        let request = ChatCompletionRequest {
            message: "hi".into(),
            chat_history: vec![HistoryTurn {
                role: ChatRole::User,
                content: "earlier".into(),
            }],
            knowledge: vec![KnowledgeSource::vector_store("design_library", "qdrant")],
            web_search_enabled: Some(false),
            ..Default::default()
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["chatHistory"][0]["role"], "user");
        assert_eq!(json["knowledge"][0]["type"], "VectorStore");
        assert_eq!(json["knowledge"][0]["client"], "qdrant");
        assert_eq!(json["webSearchEnabled"], false);
        assert!(json.get("artifact").is_none());
        assert!(json.get("modelId").is_none());
        assert!(json.get("maxTokens").is_none());
    }

    #[test]
    fn test_request_with_artifact_and_highlight() {
        let request = ChatCompletionRequest {
            message: "fix".into(),
            highlighted_text: Some(HighlightedText {
                content: "fn main()".into(),
                kind: HighlightKind::Code,
            }),
            artifact: Some(ArtifactRef {
                id: "a1".into(),
                content: "draft".into(),
            }),
            artifact_length: Some(ArtifactLength::Medium),
            ..Default::default()
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["artifact"]["id"], "a1");
        assert_eq!(json["artifact"]["content"], "draft");
        assert_eq!(json["highlightedText"]["type"], "code");
        assert_eq!(json["artifactLength"], "medium");
    }
}
