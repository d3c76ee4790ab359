//! OpenAI-compatible chat-completions client.
//!
//! Serves every backend speaking the OpenAI wire shape (OpenAI itself,
//! Groq, Mistral, Cohere's compatibility endpoint, local Ollama, and the
//! OpenRouter gateway) with per-provider base URL, credential variable,
//! and extra headers.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::proxy::types::Message;

use super::credentials::{self, ApiKey, EnvLookup};
use super::sse::SseDecoder;
use super::{ClientFactory, DeltaStream, GenerateOptions, ModelClient, ModelOutput, StreamEvent, TokenUsage};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Factory for OpenAI-compatible backends.
pub struct OpenAiCompatFactory {
    http: reqwest::Client,
    env: EnvLookup,
    provider: &'static str,
    base_url: String,
    key_var: Option<&'static str>,
    extra_headers: Vec<(&'static str, &'static str)>,
}

impl OpenAiCompatFactory {
    pub fn new(
        http: reqwest::Client,
        env: EnvLookup,
        provider: &'static str,
        base_url: impl Into<String>,
        key_var: Option<&'static str>,
    ) -> Self {
        Self {
            http,
            env,
            provider,
            base_url: base_url.into(),
            key_var,
            extra_headers: Vec::new(),
        }
    }

    /// Attach a static header to every request (gateway attribution headers).
    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.extra_headers.push((name, value));
        self
    }
}

impl ClientFactory for OpenAiCompatFactory {
    fn build(&self, model: &str) -> Result<Box<dyn ModelClient>> {
        let api_key = match self.key_var {
            Some(var) => Some(credentials::require_key(&self.env, self.provider, var)?),
            None => None,
        };

        Ok(Box::new(OpenAiCompatClient {
            http: self.http.clone(),
            provider: self.provider,
            base_url: self.base_url.clone(),
            api_key,
            extra_headers: self.extra_headers.clone(),
            model: model.to_string(),
        }))
    }
}

struct OpenAiCompatClient {
    http: reqwest::Client,
    provider: &'static str,
    base_url: String,
    api_key: Option<ApiKey>,
    extra_headers: Vec<(&'static str, &'static str)>,
    model: String,
}

impl OpenAiCompatClient {
    fn payload(&self, messages: &[Message], opts: &GenerateOptions, stream: bool) -> Value {
        let wire_messages: Vec<Value> = messages.iter().map(wire_message).collect();

        let mut payload = json!({
            "model": self.model,
            "messages": wire_messages,
        });

        let obj = payload.as_object_mut().unwrap();
        if let Some(t) = opts.temperature {
            obj.insert("temperature".to_string(), json!(t));
        }
        if let Some(m) = opts.max_tokens {
            obj.insert("max_tokens".to_string(), json!(m));
        }
        if let Some(p) = opts.top_p {
            obj.insert("top_p".to_string(), json!(p));
        }
        if let Some(f) = opts.frequency_penalty {
            obj.insert("frequency_penalty".to_string(), json!(f));
        }
        if let Some(p) = opts.presence_penalty {
            obj.insert("presence_penalty".to_string(), json!(p));
        }
        if stream {
            obj.insert("stream".to_string(), json!(true));
            // Ask for usage in the final chunk so cost accounting works
            obj.insert("stream_options".to_string(), json!({"include_usage": true}));
        }

        payload
    }

    async fn send(&self, payload: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut request = self.http.post(&url).json(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }
        for (name, value) in &self.extra_headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, provider = %self.provider, "Failed to reach provider");
            Error::Upstream(format!(
                "Failed to reach provider '{}': {}",
                self.provider, e
            ))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                provider = %self.provider,
                body = %body,
                "Provider returned error"
            );
            return Err(Error::Upstream(format!(
                "Provider '{}' returned {}: {}",
                self.provider, status, body
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    async fn generate(&self, messages: &[Message], opts: &GenerateOptions) -> Result<ModelOutput> {
        let payload = self.payload(messages, opts, false);
        let response = self.send(&payload).await?;

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            Error::Upstream(format!(
                "Failed to parse response from '{}': {}",
                self.provider, e
            ))
        })?;

        let (text, finish_reason) = completion
            .choices
            .into_iter()
            .next()
            .map(|c| (c.message.content.unwrap_or_default(), c.finish_reason))
            .unwrap_or_default();

        Ok(ModelOutput {
            text,
            usage: completion.usage.map(TokenUsage::from),
            finish_reason,
        })
    }

    async fn stream(&self, messages: &[Message], opts: &GenerateOptions) -> Result<DeltaStream> {
        let payload = self.payload(messages, opts, true);
        let response = self.send(&payload).await?;
        Ok(sse_event_stream(response, self.provider))
    }
}

fn wire_message(message: &Message) -> Value {
    let mut wire = json!({
        "role": message.role,
        "content": message.content,
    });
    if let Some(name) = &message.name {
        wire.as_object_mut()
            .unwrap()
            .insert("name".to_string(), json!(name));
    }
    wire
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<UpstreamUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Usage as reported on the wire (snake_case).
#[derive(Deserialize)]
struct UpstreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: Option<u32>,
}

impl From<UpstreamUsage> for TokenUsage {
    fn from(u: UpstreamUsage) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u
                .total_tokens
                .unwrap_or(u.prompt_tokens + u.completion_tokens),
        }
    }
}

/// Stateful translation of SSE `data:` payloads into [`StreamEvent`]s.
///
/// Usage and finish_reason accumulate across chunks and are released with
/// the terminal event. Malformed payloads are skipped.
struct StreamParser {
    usage: Option<TokenUsage>,
    finish_reason: Option<String>,
    done: bool,
}

impl StreamParser {
    fn new() -> Self {
        Self {
            usage: None,
            finish_reason: None,
            done: false,
        }
    }

    fn feed(&mut self, data: &str) -> Option<StreamEvent> {
        if self.done {
            return None;
        }
        if data == "[DONE]" {
            self.done = true;
            return Some(StreamEvent::Done {
                usage: self.usage.take(),
                finish_reason: self.finish_reason.take(),
            });
        }

        let value: Value = serde_json::from_str(data).ok()?;

        if let Some(usage) = value.get("usage").filter(|u| !u.is_null()) {
            if let Ok(parsed) = serde_json::from_value::<UpstreamUsage>(usage.clone()) {
                self.usage = Some(TokenUsage::from(parsed));
            }
        }

        let choice = value.get("choices").and_then(|c| c.get(0))?;
        if let Some(reason) = choice.get("finish_reason").and_then(|r| r.as_str()) {
            self.finish_reason = Some(reason.to_string());
        }

        let content = choice
            .get("delta")
            .and_then(|d| d.get("content"))
            .and_then(|c| c.as_str())?;
        if content.is_empty() {
            return None;
        }
        Some(StreamEvent::Delta(content.to_string()))
    }

    /// Terminal event for a stream that ended without `[DONE]`.
    fn finish(&mut self) -> Option<StreamEvent> {
        if self.done {
            return None;
        }
        self.done = true;
        Some(StreamEvent::Done {
            usage: self.usage.take(),
            finish_reason: self.finish_reason.take(),
        })
    }
}

struct SseStreamState {
    body: futures::stream::BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    decoder: SseDecoder,
    parser: StreamParser,
    pending: VecDeque<StreamEvent>,
    provider: &'static str,
    finished: bool,
}

/// Adapt an upstream SSE response into a [`DeltaStream`].
fn sse_event_stream(response: reqwest::Response, provider: &'static str) -> DeltaStream {
    let state = SseStreamState {
        body: response.bytes_stream().boxed(),
        decoder: SseDecoder::new(),
        parser: StreamParser::new(),
        pending: VecDeque::new(),
        provider,
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                return Some((Ok(event), st));
            }
            if st.finished {
                return None;
            }

            match st.body.next().await {
                Some(Ok(bytes)) => {
                    for data in st.decoder.feed(&bytes) {
                        if let Some(event) = st.parser.feed(&data) {
                            let terminal = matches!(event, StreamEvent::Done { .. });
                            st.pending.push_back(event);
                            if terminal {
                                st.finished = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    let err = Error::Upstream(format!(
                        "Stream from provider '{}' failed: {}",
                        st.provider, e
                    ));
                    return Some((Err(err), st));
                }
                None => {
                    st.finished = true;
                    // Flush a final unterminated line, then close out the parser
                    if let Some(data) = std::mem::take(&mut st.decoder).finish() {
                        if let Some(event) = st.parser.feed(&data) {
                            st.pending.push_back(event);
                        }
                    }
                    if let Some(event) = st.parser.finish() {
                        st.pending.push_back(event);
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_delta_content() {
        let mut parser = StreamParser::new();
        let event = parser.feed(
            r#"{"id":"abc","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}],"usage":null}"#,
        );
        assert_eq!(event, Some(StreamEvent::Delta("Hello".to_string())));
    }

    #[test]
    fn test_parser_usage_released_on_done() {
        let mut parser = StreamParser::new();
        assert_eq!(
            parser.feed(
                r#"{"choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":"stop"}],"usage":null}"#
            ),
            Some(StreamEvent::Delta("Hi".to_string()))
        );
        assert_eq!(
            parser.feed(
                r#"{"choices":[],"usage":{"prompt_tokens":6,"completion_tokens":10,"total_tokens":16}}"#
            ),
            None
        );

        let done = parser.feed("[DONE]").unwrap();
        match done {
            StreamEvent::Done {
                usage,
                finish_reason,
            } => {
                assert_eq!(
                    usage,
                    Some(TokenUsage {
                        prompt_tokens: 6,
                        completion_tokens: 10,
                        total_tokens: 16,
                    })
                );
                assert_eq!(finish_reason, Some("stop".to_string()));
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[test]
    fn test_parser_malformed_payload_skipped() {
        let mut parser = StreamParser::new();
        assert_eq!(parser.feed("{this is not valid json}"), None);
        assert_eq!(
            parser.feed(r#"{"choices":[{"index":0,"delta":{"content":"ok"},"finish_reason":null}]}"#),
            Some(StreamEvent::Delta("ok".to_string()))
        );
    }

    #[test]
    fn test_parser_finish_without_done_sentinel() {
        let mut parser = StreamParser::new();
        parser.feed(
            r#"{"choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":"stop"}],"usage":null}"#,
        );
        let done = parser.finish().unwrap();
        assert!(matches!(
            done,
            StreamEvent::Done {
                usage: None,
                finish_reason: Some(_)
            }
        ));
        // Only one terminal event
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_upstream_usage_total_defaults_to_sum() {
        let usage = TokenUsage::from(UpstreamUsage {
            prompt_tokens: 5,
            completion_tokens: 3,
            total_tokens: None,
        });
        assert_eq!(usage.total_tokens, 8);
    }

    #[test]
    fn test_payload_includes_stream_options_when_streaming() {
        let client = OpenAiCompatClient {
            http: reqwest::Client::new(),
            provider: "openai",
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: None,
            extra_headers: Vec::new(),
            model: "gpt-4o".to_string(),
        };
        let messages = vec![Message::user("hi")];
        let opts = GenerateOptions {
            temperature: Some(0.7),
            max_tokens: Some(4096),
            ..Default::default()
        };

        let payload = client.payload(&messages, &opts, true);
        assert_eq!(payload["model"], "gpt-4o");
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["stream_options"]["include_usage"], true);
        assert_eq!(payload["temperature"], 0.7);
        assert_eq!(payload["max_tokens"], 4096);

        let non_streaming = client.payload(&messages, &opts, false);
        assert!(non_streaming.get("stream").is_none());
        assert!(non_streaming.get("stream_options").is_none());
    }
}
