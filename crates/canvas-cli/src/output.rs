//! Incremental rendering of the in-flight assistant message.

use canvas_core::ConversationState;
use canvas_types::ChatRole;

/// What changed since the previous snapshot.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Rendered {
    /// Progress labels not shown yet
    pub progress: Vec<String>,
    /// Text to append to what was already printed
    pub text: String,
}

/// Tracks how much of the assistant message has been printed.
///
/// The composed message is not append-only: a partial start marker is shown
/// as plain text until it completes and is replaced by a placeholder. Text is
/// only emitted while the message extends what was printed, so such a rewrite
/// pauses output until the message catches up again.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    printed: String,
    events: usize,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, state: &ConversationState) -> Rendered {
        let mut rendered = Rendered::default();
        let Some(message) = state.last_message.as_ref() else {
            return rendered;
        };
        if message.role != ChatRole::Assistant {
            return rendered;
        }

        if message.events.len() > self.events {
            rendered.progress = message.events[self.events..]
                .iter()
                .filter_map(|e| e.label.clone())
                .collect();
            self.events = message.events.len();
        }

        if let Some(suffix) = message.message.strip_prefix(self.printed.as_str()) {
            rendered.text = suffix.to_string();
            self.printed.push_str(suffix);
        }
        rendered
    }

    /// Final text when the message diverged from what was printed.
    pub fn finish(&self, state: &ConversationState) -> Option<String> {
        let message = state.last_message.as_ref()?;
        (message.role == ChatRole::Assistant && message.message != self.printed)
            .then(|| message.message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_core::{ConversationStore, MemoryEditor, MessagePatch};
    use canvas_types::{ChatMessage, ChatMessageEvent};
    use std::sync::Arc;

    fn store() -> ConversationStore {
        let store = ConversationStore::new(Arc::new(MemoryEditor::new()));
        store.append_message(ChatMessage::user("q", vec![]));
        store.append_message(ChatMessage::assistant());
        store
    }

    #[test]
    fn test_emits_only_new_text() {
        let store = store();
        let mut printer = StreamPrinter::new();

        store.replace_last_message(MessagePatch::message("Hel"));
        assert_eq!(printer.render(&store.snapshot()).text, "Hel");

        store.replace_last_message(MessagePatch::message("Hello"));
        assert_eq!(printer.render(&store.snapshot()).text, "lo");
        assert_eq!(printer.render(&store.snapshot()).text, "");
        assert_eq!(printer.finish(&store.snapshot()), None);
    }

    #[test]
    fn test_emits_new_progress_labels_once() {
        let store = store();
        let mut printer = StreamPrinter::new();

        let events = vec![ChatMessageEvent::progress("Searching")];
        store.replace_last_message(MessagePatch::events(events));
        assert_eq!(printer.render(&store.snapshot()).progress, vec!["Searching"]);
        assert!(printer.render(&store.snapshot()).progress.is_empty());
    }

    #[test]
    fn test_rewritten_prefix_pauses_output() {
        let store = store();
        let mut printer = StreamPrinter::new();

        store.replace_last_message(MessagePatch::message("see |arti"));
        printer.render(&store.snapshot());

        store.replace_last_message(MessagePatch::message("see [artifact id=\"a\"]"));
        assert_eq!(printer.render(&store.snapshot()).text, "");
        assert_eq!(
            printer.finish(&store.snapshot()).as_deref(),
            Some("see [artifact id=\"a\"]")
        );
    }

    #[test]
    fn test_ignores_user_message() {
        let store = ConversationStore::new(Arc::new(MemoryEditor::new()));
        store.append_message(ChatMessage::user("q", vec![]));
        assert_eq!(StreamPrinter::new().render(&store.snapshot()), Rendered::default());
    }
}
