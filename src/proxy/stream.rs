//! Streaming response re-encoder.
//!
//! Translates provider delta events into OpenAI-style chunk frames. One
//! delta becomes exactly one `data:` frame, in order, with no batching;
//! the stream ends with the literal `data: [DONE]` sentinel. The encoder
//! is pull-based, so dropping the HTTP body stops requesting provider
//! tokens at the next suspension point.

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use uuid::Uuid;

use crate::error::Error;
use crate::providers::{DeltaStream, StreamEvent, TokenUsage};

use super::types::{ChatCompletionChunk, ChunkChoice, Delta};

/// What a finished stream produced, handed to the completion callback.
pub struct StreamOutcome {
    pub text: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

/// Invoked exactly once when the provider stream ends, with either the
/// accumulated outcome or the error that terminated it. Runs after the
/// HTTP response is already underway, so it must not block.
pub type CompletionCallback = Box<dyn FnOnce(Result<StreamOutcome, Error>) + Send>;

struct EncoderState {
    deltas: DeltaStream,
    id: String,
    created: u64,
    model: String,
    text: String,
    on_complete: Option<CompletionCallback>,
    done: bool,
}

impl EncoderState {
    fn chunk_frame(&self, content: &str) -> Bytes {
        let chunk = ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta {
                    content: Some(content.to_string()),
                },
                finish_reason: None,
            }],
        };
        // Chunk serialization cannot fail; every field is a plain value
        let json = serde_json::to_string(&chunk).unwrap_or_default();
        Bytes::from(format!("data: {}\n\n", json))
    }

    fn complete(&mut self, outcome: Result<StreamOutcome, Error>) {
        if let Some(callback) = self.on_complete.take() {
            callback(outcome);
        }
    }
}

/// Re-encode a provider delta stream as an OpenAI chunk event stream.
///
/// Already-emitted frames stay flushed when the provider fails mid-stream;
/// the error terminates the body and reaches `on_complete` for logging.
pub fn encode_event_stream(
    deltas: DeltaStream,
    model: String,
    on_complete: CompletionCallback,
) -> impl Stream<Item = Result<Bytes, Error>> + Send {
    let state = EncoderState {
        deltas,
        id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
        created: Utc::now().timestamp().max(0) as u64,
        model,
        text: String::new(),
        on_complete: Some(on_complete),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }

        match st.deltas.next().await {
            Some(Ok(StreamEvent::Delta(content))) => {
                st.text.push_str(&content);
                let frame = st.chunk_frame(&content);
                Some((Ok(frame), st))
            }
            Some(Ok(StreamEvent::Done {
                usage,
                finish_reason,
            })) => {
                let outcome = StreamOutcome {
                    text: std::mem::take(&mut st.text),
                    usage,
                    finish_reason,
                };
                st.complete(Ok(outcome));
                st.done = true;
                Some((Ok(Bytes::from_static(b"data: [DONE]\n\n")), st))
            }
            Some(Err(e)) => {
                let message = e.to_string();
                st.complete(Err(e));
                st.done = true;
                Some((Err(Error::Upstream(message)), st))
            }
            None => {
                // Provider stream ended without a terminal event
                let outcome = StreamOutcome {
                    text: std::mem::take(&mut st.text),
                    usage: None,
                    finish_reason: None,
                };
                st.complete(Ok(outcome));
                st.done = true;
                Some((Ok(Bytes::from_static(b"data: [DONE]\n\n")), st))
            }
        }
    })
}
