//! Wire transport for the chat backend.
//!
//! The `Transport` trait is the seam between the ingestion pipeline and the
//! network: one method opens the streaming response, one issues the
//! single-shot fallback request. `HttpTransport` is the reqwest-backed
//! implementation; tests script the trait directly.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use tracing::debug;

use crate::config::ClientConfig;

/// Fallback request timeout. The streaming request deliberately carries no
/// overall deadline (an open stream may legitimately run for a long time).
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Body of both the streaming and the fallback request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    /// Opaque conversation/page context assembled by the caller and passed
    /// through untouched.
    pub context: serde_json::Value,
    pub include_context: bool,
}

/// Errors at the transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Could not reach the chat backend: {0}")]
    Connect(String),

    #[error("Chat backend returned status {0}")]
    Status(u16),

    #[error("Stream read failed: {0}")]
    Read(String),

    #[error("Unusable response body: {0}")]
    Body(String),
}

/// Byte chunks of a streaming response, in arrival order.
pub type ByteStream = BoxStream<'static, std::result::Result<Bytes, TransportError>>;

/// Seam between the pipeline and the wire.
pub trait Transport: Send + Sync {
    /// Open the streaming chat response. Errors here (connect failure,
    /// non-success status) are recoverable via the fallback request.
    fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = std::result::Result<ByteStream, TransportError>> + Send;

    /// Issue the single-shot non-streaming request and return the raw
    /// response body.
    fn request_once(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = std::result::Result<String, TransportError>> + Send;
}

/// HTTP transport backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("tripmate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::TripmateError::Config(format!("HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Build a POST with JSON body and, when a session token is stored, a
    /// bearer Authorization header. The token is re-read before each
    /// request so a refreshed session is picked up without a restart.
    async fn post(&self, url: &str, request: &ChatRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(url).json(request);
        if let Some(token) = self.config.read_token().await {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    fn check_status(
        response: reqwest::Response,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}

impl Transport for HttpTransport {
    async fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<ByteStream, TransportError> {
        let url = format!("{}/api/chat/stream", self.config.base_url());
        debug!("Opening chat stream: {url}");

        let response = self
            .post(&url, request)
            .await
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let response = Self::check_status(response)?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Read(e.to_string())))
            .boxed())
    }

    async fn request_once(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<String, TransportError> {
        let url = format!("{}/api/chat", self.config.base_url());
        debug!("Issuing fallback chat request: {url}");

        let response = self
            .post(&url, request)
            .await
            .timeout(FALLBACK_TIMEOUT)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let response = Self::check_status(response)?;

        response
            .text()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))
    }
}
