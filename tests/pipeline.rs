//! End-to-end pipeline tests over a scripted transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::Notify;

use tripmate::pipeline::FAILURE_REPLY;
use tripmate::transport::ByteStream;
use tripmate::{
    ChatPipeline, ChatRequest, Message, MessageRole, SendOutcome, Transport, TranscriptHandle,
    TransportError,
};

type ChunkResult = Result<Bytes, TransportError>;

/// One scripted answer to `open_stream`.
enum StreamScript {
    /// Connection refused; the pipeline should fall back.
    Refuse,
    /// Yield these chunks, then end the stream.
    Chunks(Vec<ChunkResult>),
    /// Yield `first`, pend until the gate is notified, then yield `rest`.
    Gated {
        first: Vec<ChunkResult>,
        gate: Arc<Notify>,
        rest: Vec<ChunkResult>,
    },
    /// Block inside `open_stream` itself: signal `entered`, pend until the
    /// gate is notified, then return the chunks.
    GatedOpen {
        entered: Arc<Notify>,
        gate: Arc<Notify>,
        chunks: Vec<ChunkResult>,
    },
}

/// Transport whose responses are scripted per call. Popping an empty queue
/// panics, so a test fails loudly if the pipeline makes a request it
/// shouldn't (e.g. falling back after partial content).
struct MockTransport {
    streams: Mutex<VecDeque<StreamScript>>,
    fallbacks: Mutex<VecDeque<Result<String, TransportError>>>,
}

impl MockTransport {
    fn new() -> Self {
        Self {
            streams: Mutex::new(VecDeque::new()),
            fallbacks: Mutex::new(VecDeque::new()),
        }
    }

    fn push_stream(&self, script: StreamScript) {
        self.streams.lock().unwrap().push_back(script);
    }

    fn push_fallback(&self, result: Result<String, TransportError>) {
        self.fallbacks.lock().unwrap().push_back(result);
    }
}

impl Transport for MockTransport {
    async fn open_stream(&self, _request: &ChatRequest) -> Result<ByteStream, TransportError> {
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected open_stream call");
        match script {
            StreamScript::Refuse => Err(TransportError::Connect("connection refused".to_string())),
            StreamScript::Chunks(chunks) => Ok(stream::iter(chunks).boxed()),
            StreamScript::Gated { first, gate, rest } => {
                let tail = stream::once(async move {
                    gate.notified().await;
                    stream::iter(rest)
                })
                .flatten();
                Ok(stream::iter(first).chain(tail).boxed())
            }
            StreamScript::GatedOpen {
                entered,
                gate,
                chunks,
            } => {
                entered.notify_one();
                gate.notified().await;
                Ok(stream::iter(chunks).boxed())
            }
        }
    }

    async fn request_once(&self, _request: &ChatRequest) -> Result<String, TransportError> {
        self.fallbacks
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected fallback call")
    }
}

fn chunk(text: &str) -> ChunkResult {
    Ok(Bytes::copy_from_slice(text.as_bytes()))
}

fn read_error() -> ChunkResult {
    Err(TransportError::Read("connection reset".to_string()))
}

fn pipeline(transport: MockTransport) -> ChatPipeline<MockTransport> {
    ChatPipeline::new(transport, TranscriptHandle::new(), true)
}

fn assistant_texts(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .filter(|m| m.role == MessageRole::Assistant)
        .map(|m| m.text.clone())
        .collect()
}

async fn wait_until(transcript: &TranscriptHandle, predicate: impl Fn(&[Message]) -> bool) {
    for _ in 0..200 {
        if predicate(&transcript.snapshot()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 1s");
}

#[tokio::test]
async fn test_streamed_reply_assembled_from_deltas() {
    let transport = MockTransport::new();
    transport.push_stream(StreamScript::Chunks(vec![
        chunk("{\"reply\":\"Hi\"}\n"),
        chunk("{\"reply\":\" there\"}\n"),
    ]));
    let pipeline = pipeline(transport);

    let outcome = pipeline.send("hello", json!({})).await;
    assert_eq!(outcome, SendOutcome::Streamed);

    let messages = pipeline.transcript().snapshot();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].text, "hello");
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].text, "Hi there");
    assert!(messages[1].is_finalized());
}

#[tokio::test]
async fn test_awkward_chunk_boundaries_and_malformed_records() {
    // Records split mid-JSON and mid-multibyte-character; one malformed
    // record and one without a string reply interleaved. The final text is
    // the concatenation of the valid replies, in record order.
    let body = "{\"reply\":\"caf\u{e9} \"}\nnot json\n{\"reply\":\"au \"}\n{\"status\":\"ok\"}\n{\"reply\":\"lait\"}\n";
    let bytes = body.as_bytes();

    // Split inside the é (2 bytes in UTF-8, starting at offset 13).
    let splits = [1, 5, 14, 30, bytes.len() - 3];
    let mut chunks = Vec::new();
    let mut last = 0;
    for &split in &splits {
        chunks.push(Ok(Bytes::copy_from_slice(&bytes[last..split])));
        last = split;
    }
    chunks.push(Ok(Bytes::copy_from_slice(&bytes[last..])));

    let transport = MockTransport::new();
    transport.push_stream(StreamScript::Chunks(chunks));
    let pipeline = pipeline(transport);

    let outcome = pipeline.send("latte?", json!({})).await;
    assert_eq!(outcome, SendOutcome::Streamed);
    assert_eq!(
        assistant_texts(&pipeline.transcript().snapshot()),
        vec!["caf\u{e9} au lait".to_string()]
    );
}

#[tokio::test]
async fn test_unterminated_trailing_record_dropped() {
    let transport = MockTransport::new();
    transport.push_stream(StreamScript::Chunks(vec![
        chunk("{\"reply\":\"done\"}\n"),
        chunk("{\"reply\":\"never terminated\""),
    ]));
    let pipeline = pipeline(transport);

    pipeline.send("q", json!({})).await;
    assert_eq!(
        assistant_texts(&pipeline.transcript().snapshot()),
        vec!["done".to_string()]
    );
}

#[tokio::test]
async fn test_fallback_when_stream_refused() {
    let transport = MockTransport::new();
    transport.push_stream(StreamScript::Refuse);
    transport.push_fallback(Ok("{\"reply\": \"Fallback answer\"}".to_string()));
    let pipeline = pipeline(transport);

    let outcome = pipeline.send("hello", json!({})).await;
    assert_eq!(outcome, SendOutcome::FellBack);

    // Exactly one assistant message, no leftover empty placeholder.
    let messages = pipeline.transcript().snapshot();
    assert_eq!(assistant_texts(&messages), vec!["Fallback answer".to_string()]);
    assert!(messages[1].is_finalized());
}

#[tokio::test]
async fn test_total_failure_shows_fixed_reply() {
    let transport = MockTransport::new();
    transport.push_stream(StreamScript::Refuse);
    transport.push_fallback(Err(TransportError::Status(503)));
    let pipeline = pipeline(transport);

    let outcome = pipeline.send("hello", json!({})).await;
    assert_eq!(outcome, SendOutcome::Failed);
    assert_eq!(
        assistant_texts(&pipeline.transcript().snapshot()),
        vec![FAILURE_REPLY.to_string()]
    );
}

#[tokio::test]
async fn test_fallback_with_unusable_body_shows_fixed_reply() {
    let transport = MockTransport::new();
    transport.push_stream(StreamScript::Refuse);
    transport.push_fallback(Ok("<html>gateway error</html>".to_string()));
    let pipeline = pipeline(transport);

    let outcome = pipeline.send("hello", json!({})).await;
    assert_eq!(outcome, SendOutcome::Failed);
    assert_eq!(
        assistant_texts(&pipeline.transcript().snapshot()),
        vec![FAILURE_REPLY.to_string()]
    );
}

#[tokio::test]
async fn test_midstream_error_keeps_partial_without_fallback() {
    let transport = MockTransport::new();
    // No fallback scripted: a fallback attempt would panic the test.
    transport.push_stream(StreamScript::Chunks(vec![
        chunk("{\"reply\":\"Partial\"}\n"),
        read_error(),
    ]));
    let pipeline = pipeline(transport);

    let outcome = pipeline.send("hello", json!({})).await;
    assert_eq!(outcome, SendOutcome::Streamed);

    let messages = pipeline.transcript().snapshot();
    assert_eq!(assistant_texts(&messages), vec!["Partial".to_string()]);
    assert!(messages[1].is_finalized());
}

#[tokio::test]
async fn test_midstream_error_before_content_shows_fixed_reply() {
    let transport = MockTransport::new();
    transport.push_stream(StreamScript::Chunks(vec![read_error()]));
    let pipeline = pipeline(transport);

    let outcome = pipeline.send("hello", json!({})).await;
    assert_eq!(outcome, SendOutcome::Failed);
    assert_eq!(
        assistant_texts(&pipeline.transcript().snapshot()),
        vec![FAILURE_REPLY.to_string()]
    );
}

#[tokio::test]
async fn test_new_send_supersedes_active_session() {
    let transport = MockTransport::new();
    let gate = Arc::new(Notify::new());
    transport.push_stream(StreamScript::Gated {
        first: vec![chunk("{\"reply\":\"A1\"}\n")],
        gate: Arc::clone(&gate),
        rest: vec![chunk("{\"reply\":\"A2\"}\n")],
    });
    transport.push_stream(StreamScript::Chunks(vec![chunk("{\"reply\":\"B\"}\n")]));

    let pipeline = Arc::new(pipeline(transport));
    let transcript = pipeline.transcript().clone();

    let first = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.send("first", json!({})).await })
    };
    wait_until(&transcript, |m| m.iter().any(|m| m.text == "A1")).await;

    // Second send supersedes the first while it is pending mid-stream.
    let second = pipeline.send("second", json!({})).await;
    assert_eq!(second, SendOutcome::Streamed);

    // Release the first session's remaining chunk; it must be discarded.
    gate.notify_one();
    assert_eq!(first.await.unwrap(), SendOutcome::Superseded);

    let messages = transcript.snapshot();
    assert_eq!(
        assistant_texts(&messages),
        vec!["A1".to_string(), "B".to_string()]
    );
    // The stale placeholder was frozen by the superseding send and never
    // mutated again by its own session.
    let stale = messages.iter().find(|m| m.text == "A1").unwrap();
    assert!(stale.is_finalized());
    let fresh = messages.iter().find(|m| m.text == "B").unwrap();
    assert!(fresh.is_finalized());
}

#[tokio::test]
async fn test_superseded_before_stream_opens_leaves_no_placeholder() {
    // The first send is parked inside open_stream while a second send runs
    // to completion. When the first resumes it must not append a
    // placeholder at all: the transcript ends with the second session's
    // reply and nothing in progress.
    let transport = MockTransport::new();
    let entered = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    transport.push_stream(StreamScript::GatedOpen {
        entered: Arc::clone(&entered),
        gate: Arc::clone(&gate),
        chunks: vec![chunk("{\"reply\":\"stale\"}\n")],
    });
    transport.push_stream(StreamScript::Chunks(vec![chunk("{\"reply\":\"B\"}\n")]));

    let pipeline = Arc::new(pipeline(transport));
    let transcript = pipeline.transcript().clone();

    let first = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.send("first", json!({})).await })
    };
    entered.notified().await;

    assert_eq!(pipeline.send("second", json!({})).await, SendOutcome::Streamed);

    gate.notify_one();
    assert_eq!(first.await.unwrap(), SendOutcome::Superseded);

    let messages = transcript.snapshot();
    assert_eq!(assistant_texts(&messages), vec!["B".to_string()]);
    assert!(messages.iter().all(|m| m.is_finalized()));
}

#[tokio::test]
async fn test_empty_stream_finalizes_empty_reply() {
    let transport = MockTransport::new();
    transport.push_stream(StreamScript::Chunks(Vec::new()));
    let pipeline = pipeline(transport);

    let outcome = pipeline.send("hello", json!({})).await;
    assert_eq!(outcome, SendOutcome::Streamed);

    let messages = pipeline.transcript().snapshot();
    assert_eq!(assistant_texts(&messages), vec![String::new()]);
    assert!(messages[1].is_finalized());
}
