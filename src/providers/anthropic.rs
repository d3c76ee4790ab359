//! Anthropic Messages API client.
//!
//! Covers the plain and prompt-cached variants. The cached variant adds
//! the prompt-caching beta header and wraps marked messages in a content
//! block carrying `cache_control: {"type": "ephemeral"}`.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::proxy::types::Message;

use super::credentials::{self, ApiKey, EnvLookup};
use super::sse::SseDecoder;
use super::{ClientFactory, DeltaStream, GenerateOptions, ModelClient, ModelOutput, StreamEvent, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const CACHING_BETA: &str = "prompt-caching-2024-07-31";

/// The Messages API rejects requests without an explicit max_tokens.
const DEFAULT_MAX_TOKENS: u32 = 8192;

pub struct AnthropicFactory {
    http: reqwest::Client,
    env: EnvLookup,
    cached: bool,
    base_url: String,
}

impl AnthropicFactory {
    pub fn new(http: reqwest::Client, env: EnvLookup, cached: bool) -> Self {
        Self {
            http,
            env,
            cached,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API host (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl ClientFactory for AnthropicFactory {
    fn build(&self, model: &str) -> Result<Box<dyn ModelClient>> {
        let provider = if self.cached {
            "anthropiccached"
        } else {
            "anthropic"
        };
        let api_key = credentials::require_key(&self.env, provider, "ANTHROPIC_API_KEY")?;

        Ok(Box::new(AnthropicClient {
            http: self.http.clone(),
            api_key,
            cached: self.cached,
            base_url: self.base_url.clone(),
            model: model.to_string(),
        }))
    }
}

struct AnthropicClient {
    http: reqwest::Client,
    api_key: ApiKey,
    cached: bool,
    base_url: String,
    model: String,
}

impl AnthropicClient {
    fn payload(&self, messages: &[Message], opts: &GenerateOptions, stream: bool) -> Value {
        // System messages live in a top-level parameter, not the turn list
        let system: Vec<String> = messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.to_text())
            .collect();

        let turns: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| self.wire_message(m))
            .collect();

        let mut payload = json!({
            "model": self.model,
            "messages": turns,
            "max_tokens": opts.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        let obj = payload.as_object_mut().unwrap();
        if !system.is_empty() {
            obj.insert("system".to_string(), json!(system.join("\n\n")));
        }
        if let Some(t) = opts.temperature {
            obj.insert("temperature".to_string(), json!(t));
        }
        if let Some(p) = opts.top_p {
            obj.insert("top_p".to_string(), json!(p));
        }
        if stream {
            obj.insert("stream".to_string(), json!(true));
        }

        payload
    }

    fn wire_message(&self, message: &Message) -> Value {
        if self.cached && message.cache_marked {
            json!({
                "role": message.role,
                "content": [{
                    "type": "text",
                    "text": message.content.to_text(),
                    "cache_control": {"type": "ephemeral"},
                }],
            })
        } else {
            // The Messages API content-block schema differs from the
            // OpenAI parts schema, so multi-part content is flattened
            json!({
                "role": message.role,
                "content": message.content.to_text(),
            })
        }
    }

    async fn send(&self, payload: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/v1/messages", self.base_url);
        let mut request = self
            .http
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(payload);
        if self.cached {
            request = request.header("anthropic-beta", CACHING_BETA);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, provider = "anthropic", "Failed to reach provider");
            Error::Upstream(format!("Failed to reach provider 'anthropic': {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                provider = "anthropic",
                body = %body,
                "Provider returned error"
            );
            return Err(Error::Upstream(format!(
                "Provider 'anthropic' returned {}: {}",
                status, body
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn generate(&self, messages: &[Message], opts: &GenerateOptions) -> Result<ModelOutput> {
        let payload = self.payload(messages, opts, false);
        let response = self.send(&payload).await?;

        let value: Value = response.json().await.map_err(|e| {
            Error::Upstream(format!("Failed to parse response from 'anthropic': {}", e))
        })?;

        let text = value
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let finish_reason = value
            .get("stop_reason")
            .and_then(|r| r.as_str())
            .map(String::from);

        let usage = value.get("usage").and_then(parse_usage);

        Ok(ModelOutput {
            text,
            usage,
            finish_reason,
        })
    }

    async fn stream(&self, messages: &[Message], opts: &GenerateOptions) -> Result<DeltaStream> {
        let payload = self.payload(messages, opts, true);
        let response = self.send(&payload).await?;
        Ok(event_stream(response))
    }
}

fn parse_usage(usage: &Value) -> Option<TokenUsage> {
    let input = usage.get("input_tokens")?.as_u64()? as u32;
    let output = usage.get("output_tokens")?.as_u64()? as u32;
    Some(TokenUsage {
        prompt_tokens: input,
        completion_tokens: output,
        total_tokens: input + output,
    })
}

/// Translates Messages API stream events into [`StreamEvent`]s.
///
/// Input token counts arrive in `message_start`, output counts in the
/// final `message_delta`; both are held until `message_stop`.
struct StreamParser {
    input_tokens: u32,
    output_tokens: u32,
    finish_reason: Option<String>,
    done: bool,
}

impl StreamParser {
    fn new() -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: None,
            done: false,
        }
    }

    fn feed(&mut self, data: &str) -> Option<StreamEvent> {
        if self.done {
            return None;
        }
        let value: Value = serde_json::from_str(data).ok()?;

        match value.get("type").and_then(|t| t.as_str())? {
            "message_start" => {
                if let Some(n) = value
                    .pointer("/message/usage/input_tokens")
                    .and_then(|v| v.as_u64())
                {
                    self.input_tokens = n as u32;
                }
                None
            }
            "content_block_delta" => {
                let delta = value.get("delta")?;
                if delta.get("type").and_then(|t| t.as_str()) != Some("text_delta") {
                    return None;
                }
                let text = delta.get("text").and_then(|t| t.as_str())?;
                if text.is_empty() {
                    return None;
                }
                Some(StreamEvent::Delta(text.to_string()))
            }
            "message_delta" => {
                if let Some(reason) = value
                    .pointer("/delta/stop_reason")
                    .and_then(|r| r.as_str())
                {
                    self.finish_reason = Some(reason.to_string());
                }
                if let Some(n) = value
                    .pointer("/usage/output_tokens")
                    .and_then(|v| v.as_u64())
                {
                    self.output_tokens = n as u32;
                }
                None
            }
            "message_stop" => Some(self.terminate()),
            _ => None,
        }
    }

    fn terminate(&mut self) -> StreamEvent {
        self.done = true;
        let usage = (self.input_tokens > 0 || self.output_tokens > 0).then(|| TokenUsage {
            prompt_tokens: self.input_tokens,
            completion_tokens: self.output_tokens,
            total_tokens: self.input_tokens + self.output_tokens,
        });
        StreamEvent::Done {
            usage,
            finish_reason: self.finish_reason.take(),
        }
    }

    fn finish(&mut self) -> Option<StreamEvent> {
        if self.done {
            return None;
        }
        Some(self.terminate())
    }
}

fn event_stream(response: reqwest::Response) -> DeltaStream {
    struct State {
        body: futures::stream::BoxStream<'static, reqwest::Result<bytes::Bytes>>,
        decoder: SseDecoder,
        parser: StreamParser,
        pending: VecDeque<StreamEvent>,
        finished: bool,
    }

    let state = State {
        body: response.bytes_stream().boxed(),
        decoder: SseDecoder::new(),
        parser: StreamParser::new(),
        pending: VecDeque::new(),
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
                    let err =
                        Error::Upstream(format!("Stream from provider 'anthropic' failed: {}", e));
                    return Some((Err(err), st));
                }
                None => {
                    st.finished = true;
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
