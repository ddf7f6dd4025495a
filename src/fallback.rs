//! Single-shot fallback request, used when a stream cannot be established.
//!
//! The fallback response is one JSON object whose `reply` field carries the
//! complete answer (not a delta).

use serde::Deserialize;
use tracing::debug;

use crate::transport::{ChatRequest, Transport, TransportError};

#[derive(Debug, Deserialize)]
struct ReplyBody {
    reply: String,
}

/// Issue the non-streaming request and extract the complete reply text.
pub async fn request_reply<T: Transport>(
    transport: &T,
    request: &ChatRequest,
) -> std::result::Result<String, TransportError> {
    let body = transport.request_once(request).await?;
    let parsed: ReplyBody =
        serde_json::from_str(&body).map_err(|e| TransportError::Body(e.to_string()))?;
    debug!("Fallback request produced {} chars", parsed.reply.len());
    Ok(parsed.reply)
}
