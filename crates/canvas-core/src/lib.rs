//! Streaming completion client for the canvas editor.

pub mod classifier;
mod controller;
mod error;
mod splitter;
mod store;
mod transport;

pub use controller::{
    ControllerConfig, Cycle, CycleOutcome, CyclePhase, RequestOptions, SessionController,
    ARTIFACT_MARKER_END, ARTIFACT_MARKER_START, DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT,
};
pub use error::CanvasError;
pub use splitter::split_content;
pub use store::{
    AppStateStore, ConversationState, ConversationStore, DocumentPatch, EditorSurface,
    MemoryEditor, MessagePatch,
};
pub use transport::{CloseHandler, CloseInfo, ErrorHandler, MessageHandler, Transport};

/// Result type for canvas operations.
pub type Result<T> = std::result::Result<T, CanvasError>;
