//! Shared types for the Canvas chat and document pipeline.

mod artifact;
mod chat;
mod request;
mod response;

pub use artifact::*;
pub use chat::*;
pub use request::*;
pub use response::*;

/// Get current time in milliseconds since Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
