//! The chat transcript: an ordered log of user/assistant messages.
//!
//! An assistant message may be created empty and mutated in place while a
//! stream is running; once finalized it is immutable. Mutations on a
//! finalized or unknown id are no-ops so that a superseded stream racing
//! against finalize can never corrupt the log.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

/// Opaque, transcript-unique message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(u64);

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub role: MessageRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Set when the message is finalized; `None` while still in progress.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_finalized(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Ordered sequence of messages, owned by one widget instance.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new message and return its id. User messages are complete
    /// on arrival and are finalized immediately; assistant messages start
    /// in-progress (empty or not) until `finalize` is called.
    pub fn append(&mut self, role: MessageRole, text: impl Into<String>) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;

        let now = Utc::now();
        self.messages.push(Message {
            id,
            role,
            text: text.into(),
            created_at: now,
            completed_at: if role == MessageRole::User {
                Some(now)
            } else {
                None
            },
        });
        id
    }

    /// Append a delta to an in-progress message. No-op if the id is unknown
    /// or the message has been finalized.
    pub fn push_delta(&mut self, id: MessageId, delta: &str) {
        if let Some(msg) = self.in_progress_mut(id) {
            msg.text.push_str(delta);
        }
    }

    /// Replace the full text of an in-progress message. No-op if the id is
    /// unknown or finalized. Used by the fallback path, which produces the
    /// whole reply in one mutation.
    pub fn set_text(&mut self, id: MessageId, text: impl Into<String>) {
        if let Some(msg) = self.in_progress_mut(id) {
            msg.text = text.into();
        }
    }

    /// Mark a message immutable, stamping its completion time. No-op on an
    /// unknown or already-finalized id.
    pub fn finalize(&mut self, id: MessageId) {
        if let Some(msg) = self.in_progress_mut(id) {
            msg.completed_at = Some(Utc::now());
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn in_progress_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .filter(|m| !m.is_finalized())
    }
}

/// Cloneable handle to a transcript shared between the pipeline and the
/// renderer. Every method takes the lock for the duration of one mutation,
/// so individual updates never interleave mid-update.
#[derive(Debug, Clone, Default)]
pub struct TranscriptHandle {
    inner: Arc<Mutex<Transcript>>,
}

impl TranscriptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, role: MessageRole, text: impl Into<String>) -> MessageId {
        self.lock().append(role, text)
    }

    pub fn push_delta(&self, id: MessageId, delta: &str) {
        self.lock().push_delta(id, delta);
    }

    pub fn set_text(&self, id: MessageId, text: impl Into<String>) {
        self.lock().set_text(id, text);
    }

    pub fn finalize(&self, id: MessageId) {
        self.lock().finalize(id);
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Cloned snapshot of the full ordered transcript, for rendering.
    pub fn snapshot(&self) -> Vec<Message> {
        self.lock().messages().to_vec()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Transcript> {
        // Mutations never panic while holding the lock, but recover from
        // poisoning anyway rather than propagating a panic into the UI.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
