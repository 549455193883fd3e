//! Conversation and application state containers.
//!
//! State is held as an `Arc` snapshot inside a `watch` channel. Every write
//! clones-on-write through `Arc::make_mut` under the channel lock, so readers
//! holding a snapshot never observe a half-applied update and subscribers
//! are woken once per transition.

use canvas_types::{
    Artifact, Author, ChatMessage, ChatMessageEvent, ContextItem, HighlightedText, InputMessage,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, trace};

/// Sink for document content, typically a rich-text editor.
pub trait EditorSurface: Send + Sync {
    /// Replace the editor's content.
    fn set_content(&self, text: &str);
}

/// In-memory editor surface that keeps the latest content.
#[derive(Debug, Default)]
pub struct MemoryEditor {
    content: Mutex<String>,
    writes: Mutex<usize>,
}

impl MemoryEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> String {
        self.content.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of `set_content` calls received.
    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EditorSurface for MemoryEditor {
    fn set_content(&self, text: &str) {
        *self.content.lock().unwrap_or_else(|e| e.into_inner()) = text.to_string();
        *self.writes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }
}

/// Snapshot of the conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    /// Document currently open in the editor
    pub current_document: Artifact,
    /// All known documents by id
    pub documents: HashMap<String, Artifact>,
    /// Message currently being streamed into
    pub last_message: Option<ChatMessage>,
    /// Completed messages, oldest first
    pub history: Vec<ChatMessage>,
    pub input: InputMessage,
}

impl ConversationState {
    /// History followed by the in-flight message, if any.
    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.history.iter().chain(self.last_message.iter())
    }
}

/// Partial update of the in-flight message.
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub message: Option<String>,
    pub events: Option<Vec<ChatMessageEvent>>,
}

impl MessagePatch {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn events(events: Vec<ChatMessageEvent>) -> Self {
        Self {
            events: Some(events),
            ..Default::default()
        }
    }
}

/// Partial update of the current document.
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub content: Option<String>,
    pub metadata: Option<Value>,
}

impl DocumentPatch {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            metadata: None,
        }
    }
}

/// Holds chat history, the in-flight message, the input field and documents.
pub struct ConversationStore {
    state: watch::Sender<Arc<ConversationState>>,
    editor: Arc<dyn EditorSurface>,
}

impl ConversationStore {
    pub fn new(editor: Arc<dyn EditorSurface>) -> Self {
        Self::with_state(ConversationState::default(), editor)
    }

    pub fn with_state(state: ConversationState, editor: Arc<dyn EditorSurface>) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(state));
        Self { state: tx, editor }
    }

    /// Current immutable snapshot.
    pub fn snapshot(&self) -> Arc<ConversationState> {
        self.state.borrow().clone()
    }

    /// Receive a new snapshot after every transition.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ConversationState>> {
        self.state.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut ConversationState)) {
        self.state.send_modify(|state| f(Arc::make_mut(state)));
    }

    /// Make `message` the in-flight message, moving the previous one into history.
    pub fn append_message(&self, message: ChatMessage) {
        debug!(target: "canvas::store", "Appending {} message", message.role.as_str());
        self.update(|state| {
            if let Some(previous) = state.last_message.replace(message) {
                state.history.push(previous);
            }
        });
    }

    /// Apply `patch` to the in-flight message. No-op without one.
    pub fn replace_last_message(&self, patch: MessagePatch) {
        self.update(|state| {
            if let Some(last) = state.last_message.as_mut() {
                if let Some(message) = patch.message {
                    last.message = message;
                }
                if let Some(events) = patch.events {
                    last.events = events;
                }
            }
        });
    }

    /// Switch the current document, archiving the previous one when it has content.
    pub fn set_current_document(&self, document: Artifact) {
        debug!(target: "canvas::store", "Switching current document to {}", document.id);
        self.editor.set_content(&document.content);
        self.update(|state| {
            let previous = std::mem::replace(&mut state.current_document, document.clone());
            if !previous.is_empty() {
                state.documents.insert(previous.id.clone(), previous);
            }
            state.documents.insert(document.id.clone(), document);
        });
    }

    /// Merge `patch` into the current document and record it in the collection.
    pub fn merge_current_document(&self, patch: DocumentPatch) {
        if let Some(content) = patch.content.as_deref() {
            trace!(target: "canvas::store", "Document content now {} bytes", content.len());
            self.editor.set_content(content);
        }
        self.update(|state| {
            let current = &mut state.current_document;
            if let Some(content) = patch.content {
                current.content = content;
            }
            if let Some(metadata) = patch.metadata {
                current.metadata = Some(metadata);
            }
            state.documents.insert(current.id.clone(), current.clone());
        });
    }

    pub fn set_input_value(&self, value: impl Into<String>) {
        let value = value.into();
        self.update(|state| state.input.value = value);
    }

    pub fn set_input_context(&self, context: Vec<ContextItem>) {
        self.update(|state| state.input.context = context);
    }

    pub fn set_highlighted_text(&self, highlighted: Option<HighlightedText>) {
        self.update(|state| state.input.highlighted = highlighted);
    }

    /// Open a user-authored document with the given content.
    pub fn open_document(&self, id: impl Into<String>, content: impl Into<String>) {
        self.set_current_document(Artifact::with_content(id, content, Author::User));
    }
}

/// Application-wide flags shared with the UI.
pub struct AppStateStore {
    generation_active: watch::Sender<bool>,
}

impl Default for AppStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStateStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { generation_active: tx }
    }

    pub fn set_generation_active(&self, active: bool) {
        self.generation_active.send_replace(active);
    }

    pub fn generation_active(&self) -> bool {
        *self.generation_active.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.generation_active.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (ConversationStore, Arc<MemoryEditor>) {
        let editor = Arc::new(MemoryEditor::new());
        (ConversationStore::new(editor.clone()), editor)
    }

    #[test]
    fn test_append_moves_previous_into_history() {
        let (store, _) = store();
        store.append_message(ChatMessage::user("hi", vec![]));
        store.append_message(ChatMessage::assistant());

        let snap = store.snapshot();
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.history[0].message, "hi");
        assert!(snap.last_message.as_ref().unwrap().message.is_empty());
        assert_eq!(snap.messages().count(), 2);
    }

    #[test]
    fn test_replace_last_message_without_message_is_noop() {
        let (store, _) = store();
        store.replace_last_message(MessagePatch::message("lost"));
        assert!(store.snapshot().last_message.is_none());
    }

    #[test]
    fn test_replace_last_message_patches_fields() {
        let (store, _) = store();
        store.append_message(ChatMessage::assistant());
        store.replace_last_message(MessagePatch::events(vec![ChatMessageEvent::progress("step")]));
        store.replace_last_message(MessagePatch::message("text"));

        let last = store.snapshot().last_message.clone().unwrap();
        assert_eq!(last.message, "text");
        assert_eq!(last.events.len(), 1);
    }

    #[test]
    fn test_snapshots_are_not_mutated_by_later_writes() {
        let (store, _) = store();
        store.append_message(ChatMessage::assistant());
        let before = store.snapshot();

        store.replace_last_message(MessagePatch::message("after"));

        assert!(before.last_message.as_ref().unwrap().message.is_empty());
        assert_eq!(store.snapshot().last_message.as_ref().unwrap().message, "after");
    }

    #[test]
    fn test_switching_document_archives_non_empty_previous() {
        let (store, editor) = store();
        store.open_document("draft", "first version");
        store.set_current_document(Artifact::empty(Some("next".into()), Author::Assistant));

        let snap = store.snapshot();
        assert_eq!(snap.current_document.id, "next");
        assert_eq!(snap.documents["draft"].content, "first version");
        assert!(snap.documents.contains_key("next"));
        assert_eq!(editor.content(), "");
    }

    #[test]
    fn test_switching_from_empty_document_does_not_archive_it() {
        let (store, _) = store();
        let initial_id = store.snapshot().current_document.id.clone();
        store.set_current_document(Artifact::empty(Some("next".into()), Author::Assistant));

        assert!(!store.snapshot().documents.contains_key(&initial_id));
    }

    #[test]
    fn test_merge_document_updates_collection_and_editor() {
        let (store, editor) = store();
        store.set_current_document(Artifact::empty(Some("a1".into()), Author::Assistant));
        store.merge_current_document(DocumentPatch::content("body"));

        let snap = store.snapshot();
        assert_eq!(snap.current_document.content, "body");
        assert_eq!(snap.documents["a1"].content, "body");
        assert_eq!(editor.content(), "body");
        assert_eq!(editor.writes(), 2);
    }

    #[test]
    fn test_input_updates() {
        let (store, _) = store();
        store.set_input_value("question");
        store.set_highlighted_text(Some(HighlightedText {
            content: "x".into(),
            kind: canvas_types::HighlightKind::Plain,
        }));

        let snap = store.snapshot();
        assert_eq!(snap.input.value, "question");
        assert!(snap.input.highlighted.is_some());
    }

    #[tokio::test]
    async fn test_subscribers_see_each_transition() {
        let (store, _) = store();
        let mut rx = store.subscribe();

        store.set_input_value("typed");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().input.value, "typed");
    }

    #[test]
    fn test_generation_flag() {
        let app = AppStateStore::new();
        assert!(!app.generation_active());
        app.set_generation_active(true);
        assert!(app.generation_active());
    }
}
