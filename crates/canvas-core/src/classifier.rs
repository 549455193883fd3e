//! Response classification.
//!
//! Decoding happens once at the I/O edge: a raw frame either becomes a
//! [`ResponseEnvelope`] or a `MalformedResponse` error. The envelope is then
//! mapped to the one action the cycle state machine cares about.

use crate::{CanvasError, Result};
use canvas_types::{ResponseEnvelope, UsageInfo};

/// What a decoded envelope asks the cycle to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Progress notification, optionally starting a new document.
    Progress {
        description: Option<String>,
        artifact_id: Option<String>,
    },
    /// Partial completion text to accumulate.
    Chunk(String),
    /// Terminal usage signal; the cycle ends.
    Terminate(Option<UsageInfo>),
    /// No state transition (sources, errors, confirmations, ...).
    Passthrough,
}

/// Decode one raw text frame.
pub fn decode(raw: &str) -> Result<ResponseEnvelope> {
    serde_json::from_str(raw)
        .map_err(|e| CanvasError::MalformedResponse(format!("{e}: {}", truncate(raw))))
}

/// Map an envelope to its action.
pub fn classify(envelope: &ResponseEnvelope) -> Action {
    match envelope {
        ResponseEnvelope::Event(body) => Action::Progress {
            description: body.description().map(str::to_string),
            artifact_id: body.artifact_id(),
        },
        ResponseEnvelope::CompletionChunk(body) => match body.text() {
            Some(text) => Action::Chunk(text),
            None => Action::Passthrough,
        },
        ResponseEnvelope::CompletionUsage(body) => Action::Terminate(body.usage()),
        ResponseEnvelope::CompletionResponse(_)
        | ResponseEnvelope::CompletionSources(_)
        | ResponseEnvelope::HitlRequest(_)
        | ResponseEnvelope::Error(_)
        | ResponseEnvelope::Confirmation(_) => Action::Passthrough,
    }
}

/// Shorten a frame for log output.
fn truncate(s: &str) -> String {
    const MAX_LEN: usize = 120;
    if s.len() <= MAX_LEN {
        s.to_string()
    } else {
        let mut end = MAX_LEN;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(raw: &str) -> Action {
        classify(&decode(raw).unwrap())
    }

    #[test]
    fn test_chunk_with_content() {
        assert_eq!(
            action(r#"{"type":"completion.chunk","content":"abc"}"#),
            Action::Chunk("abc".into())
        );
    }

    #[test]
    fn test_chunk_without_content_passes_through() {
        assert_eq!(action(r#"{"type":"completion.chunk"}"#), Action::Passthrough);
        assert_eq!(action(r#"{"type":"completion.chunk","content":null}"#), Action::Passthrough);
    }

    #[test]
    fn test_numeric_chunk_content_is_text() {
        assert_eq!(
            action(r#"{"type":"completion.chunk","content":42}"#),
            Action::Chunk("42".into())
        );
    }

    #[test]
    fn test_usage_terminates() {
        assert_eq!(
            action(r#"{"type":"completion.usage","payload":{"generated_tokens":3}}"#),
            Action::Terminate(Some(UsageInfo {
                generated_tokens: 3,
                ..Default::default()
            }))
        );
        assert_eq!(action(r#"{"type":"completion.usage"}"#), Action::Terminate(None));
    }

    #[test]
    fn test_event_fields() {
        let raw = serde_json::json!({
            "type": "event",
            "payload": { "description": "Searching", "payload": { "artifactId": "X" } }
        });
        assert_eq!(
            action(&raw.to_string()),
            Action::Progress {
                description: Some("Searching".into()),
                artifact_id: Some("X".into()),
            }
        );
        assert_eq!(
            action(r#"{"type":"event","payload":{}}"#),
            Action::Progress {
                description: None,
                artifact_id: None,
            }
        );
    }

    #[test]
    fn test_other_tags_pass_through() {
        for raw in [
            r#"{"type":"completion.response","content":"full"}"#,
            r#"{"type":"completion.sources","payload":[]}"#,
            r#"{"type":"completion.hitl.request"}"#,
            r#"{"type":"error","content":"boom"}"#,
            r#"{"type":"confirmation","content":"Starting workflow"}"#,
        ] {
            assert_eq!(action(raw), Action::Passthrough, "{raw}");
        }
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(decode("not json"), Err(CanvasError::MalformedResponse(_))));
        assert!(matches!(decode(r#"{"type":"mystery"}"#), Err(CanvasError::MalformedResponse(_))));
        assert!(matches!(decode(r#"[1,2,3]"#), Err(CanvasError::MalformedResponse(_))));
    }

    #[test]
    fn test_truncate_long_frame() {
        let long = "é".repeat(100);
        let short = truncate(&long);
        assert!(short.ends_with("..."));
        assert!(short.len() <= 123);
    }
}
