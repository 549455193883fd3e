//! Error types for the completion pipeline.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CanvasError {
    #[error("WebSocket is not connected")]
    NotConnected,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request ended on timeout after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("A completion cycle is already in progress")]
    CycleInProgress,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for CanvasError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        CanvasError::Transport(err.to_string())
    }
}
