//! Tripmate - streaming support-chat client
//!
//! The core of the Tripmate travel planner's support chat:
//! - Incremental ingestion of a line-delimited streaming chat response
//! - Automatic fallback to a one-shot request when streaming is unavailable
//! - An ordered transcript updated token-by-token while streaming
//! - Widget interaction state (open/pinned/resize) independent of the
//!   message flow

pub mod config;
pub mod fallback;
pub mod line_buffer;
pub mod pipeline;
pub mod record;
pub mod transcript;
pub mod transport;
pub mod tui;
pub mod widget;

pub use config::ClientConfig;
pub use pipeline::{ChatPipeline, SendOutcome};
pub use transcript::{Message, MessageId, MessageRole, Transcript, TranscriptHandle};
pub use transport::{ChatRequest, HttpTransport, Transport, TransportError};
pub use widget::{WidgetController, WidgetEvent, WidgetUiState};

/// Result type for Tripmate operations
pub type Result<T> = std::result::Result<T, TripmateError>;

/// Errors that can occur in Tripmate
#[derive(Debug, thiserror::Error)]
pub enum TripmateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
