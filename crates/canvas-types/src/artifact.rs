//! Document ("artifact") types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::now_ms;

/// Who produced a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    #[default]
    Assistant,
}

/// A named block of document content shown in the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub content: String,
    pub author: Author,
    /// Creation time (ms since Unix epoch)
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Artifact {
    /// Create an empty document, generating an id when none is given.
    pub fn empty(id: Option<String>, author: Author) -> Self {
        Self {
            id: id.unwrap_or_else(short_id),
            content: String::new(),
            author,
            timestamp: now_ms(),
            metadata: None,
        }
    }

    /// Create a document with the given content.
    pub fn with_content(id: impl Into<String>, content: impl Into<String>, author: Author) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            author,
            timestamp: now_ms(),
            metadata: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl Default for Artifact {
    fn default() -> Self {
        Self::empty(None, Author::Assistant)
    }
}

/// Generate a short random identifier (12 alphanumeric characters).
pub fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}
