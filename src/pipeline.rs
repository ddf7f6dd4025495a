//! The incremental chat-response ingestion pipeline.
//!
//! `send` drives one attempt end to end: open the stream, append a
//! placeholder assistant message, feed arriving bytes through the line
//! buffer and record parser, and apply each delta to the placeholder in
//! arrival order. If the stream cannot be established the single-shot
//! fallback request takes over; if everything fails with no content shown,
//! the transcript gets one fixed, user-safe failure message. No error
//! escapes this module.
//!
//! Single-flight: each `send` bumps a generation counter, and every sink
//! mutation is guarded by a currency check, so a superseded session's
//! residual bytes are discarded instead of racing the new one.

use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tracing::{debug, warn};

use crate::fallback;
use crate::line_buffer::LineBuffer;
use crate::record::{parse_record, Fragment};
use crate::transcript::{MessageId, MessageRole, TranscriptHandle};
use crate::transport::{ByteStream, ChatRequest, Transport};

/// Shown in the transcript when both streaming and fallback fail with no
/// content produced. Never replaced by raw error text.
pub const FAILURE_REPLY: &str =
    "Sorry, something went wrong while answering. Please try again in a moment.";

/// How one `send` resolved. User-visible behavior goes only through the
/// transcript; this is for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The stream produced the reply (possibly truncated by a mid-stream
    /// failure after some content was shown).
    Streamed,
    /// The stream could not be established; the fallback request answered.
    FellBack,
    /// A newer `send` started; this session's remaining work was discarded.
    Superseded,
    /// Nothing produced any content; the fixed failure reply was shown.
    Failed,
}

/// Session bookkeeping, guarded by one lock so the generation bump and the
/// placeholder takeover are a single critical section. Checking currency
/// and registering a placeholder under the same lock means a superseding
/// send either sees the placeholder (and finalizes it) or the superseded
/// session never creates one.
#[derive(Debug, Default)]
struct SessionState {
    /// Generation of the most recently started send.
    generation: u64,
    /// Placeholder of the in-progress session, if any. At most one
    /// assistant message is mutable at a time, and it is always the most
    /// recent one; a superseding send finalizes the stale placeholder
    /// before starting its own.
    active_placeholder: Option<MessageId>,
}

/// Drives chat sends against one transcript.
pub struct ChatPipeline<T: Transport> {
    transport: T,
    transcript: TranscriptHandle,
    include_context: bool,
    session: Mutex<SessionState>,
}

impl<T: Transport> ChatPipeline<T> {
    pub fn new(transport: T, transcript: TranscriptHandle, include_context: bool) -> Self {
        Self {
            transport,
            transcript,
            include_context,
            session: Mutex::new(SessionState::default()),
        }
    }

    pub fn transcript(&self) -> &TranscriptHandle {
        &self.transcript
    }

    /// Send one user message. Appends the user message immediately, then
    /// streams the reply into a placeholder assistant message, falling back
    /// to the one-shot request if the stream cannot be opened.
    ///
    /// Starting a new `send` while another is in flight supersedes the old
    /// one: its placeholder is frozen as-is and its future bytes are
    /// discarded.
    pub async fn send(&self, message: &str, context: serde_json::Value) -> SendOutcome {
        let (generation, stale) = {
            let mut session = self.lock_session();
            session.generation += 1;
            (session.generation, session.active_placeholder.take())
        };

        // Freeze the superseded session's placeholder, if one is still in
        // progress; its session will discard its own future reads.
        if let Some(stale) = stale {
            debug!("Finalizing stale placeholder from superseded session");
            self.transcript.finalize(stale);
        }

        self.transcript.append(MessageRole::User, message);

        let request = ChatRequest {
            message: message.to_string(),
            context,
            include_context: self.include_context,
        };

        match self.transport.open_stream(&request).await {
            Ok(stream) => self.consume_stream(generation, stream).await,
            Err(e) => {
                warn!("Chat stream unavailable, falling back: {e}");
                self.fall_back(generation, &request).await
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_session().generation == generation
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the active-placeholder marker, but only if it still belongs to
    /// this session (a newer send may have replaced it already).
    fn clear_active(&self, id: MessageId) {
        let mut session = self.lock_session();
        if session.active_placeholder == Some(id) {
            session.active_placeholder = None;
        }
    }

    /// Create and register this session's placeholder, or refuse if a newer
    /// send has started. Done under the session lock so a superseding send
    /// can never slip between the currency check and the registration.
    fn register_placeholder(&self, generation: u64) -> Option<MessageId> {
        let mut session = self.lock_session();
        if session.generation != generation {
            return None;
        }
        let placeholder = self.transcript.append(MessageRole::Assistant, "");
        session.active_placeholder = Some(placeholder);
        Some(placeholder)
    }

    /// Read loop over an established stream. The placeholder is created
    /// here, once the stream is known to be open.
    async fn consume_stream(&self, generation: u64, mut stream: ByteStream) -> SendOutcome {
        let Some(placeholder) = self.register_placeholder(generation) else {
            return SendOutcome::Superseded;
        };
        let mut lines = LineBuffer::new();
        let mut applied_any = false;

        while let Some(chunk) = stream.next().await {
            if !self.is_current(generation) {
                debug!("Discarding chunk from superseded session {generation}");
                return SendOutcome::Superseded;
            }

            match chunk {
                Ok(bytes) => {
                    for record in lines.append(&bytes) {
                        if let Fragment::Delta(delta) = parse_record(&record) {
                            self.transcript.push_delta(placeholder, &delta);
                            applied_any = true;
                        }
                    }
                }
                Err(e) if applied_any => {
                    // Partial output already shown; keep it rather than
                    // discarding or re-falling-back.
                    warn!("Stream failed mid-reply, keeping partial text: {e}");
                    self.transcript.finalize(placeholder);
                    self.clear_active(placeholder);
                    return SendOutcome::Streamed;
                }
                Err(e) => {
                    warn!("Stream failed before any content: {e}");
                    self.transcript.set_text(placeholder, FAILURE_REPLY);
                    self.transcript.finalize(placeholder);
                    self.clear_active(placeholder);
                    return SendOutcome::Failed;
                }
            }
        }

        lines.flush();
        if !self.is_current(generation) {
            return SendOutcome::Superseded;
        }
        self.transcript.finalize(placeholder);
        self.clear_active(placeholder);
        SendOutcome::Streamed
    }

    /// One-shot fallback. Appends its own assistant message; the streaming
    /// placeholder is only created after a stream opens, so there is never
    /// an empty placeholder left behind on this path.
    async fn fall_back(&self, generation: u64, request: &ChatRequest) -> SendOutcome {
        match fallback::request_reply(&self.transport, request).await {
            Ok(reply) => {
                if !self.append_final(generation, &reply) {
                    return SendOutcome::Superseded;
                }
                SendOutcome::FellBack
            }
            Err(e) => {
                warn!("Fallback request failed: {e}");
                if !self.append_final(generation, FAILURE_REPLY) {
                    return SendOutcome::Superseded;
                }
                SendOutcome::Failed
            }
        }
    }

    /// Append a complete, finalized assistant message, or refuse if a newer
    /// send has started. Under the session lock for the same reason as
    /// `register_placeholder`.
    fn append_final(&self, generation: u64, text: &str) -> bool {
        let session = self.lock_session();
        if session.generation != generation {
            return false;
        }
        let id = self.transcript.append(MessageRole::Assistant, text);
        self.transcript.finalize(id);
        true
    }
}
