//! Backend model clients and the provider registry.
//!
//! Every backend is reached through the [`ModelClient`] capability trait;
//! the registry maps a case-insensitive provider identifier to a factory.
//! Adding a provider means registering a new factory, not editing a
//! central dispatcher.

mod anthropic;
pub mod credentials;
mod openai;
pub mod sse;

pub use anthropic::AnthropicFactory;
pub use openai::{OpenAiCompatFactory, OPENAI_BASE_URL};

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::proxy::types::Message;
use credentials::EnvLookup;

/// Token usage reported by a backend for one request.
///
/// Serialized in camelCase to match the external result shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Result of a non-streaming generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOutput {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Sampling parameters forwarded to a backend.
///
/// The model itself is fixed at client construction time.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
}

/// One event from a streaming generation.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental text delta, in provider emission order.
    Delta(String),
    /// Stream finished; usage is only known here, if the backend reports it.
    Done {
        usage: Option<TokenUsage>,
        finish_reason: Option<String>,
    },
}

/// A finite, non-restartable stream of generation events.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Capability interface for a resolved backend model client.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run a non-streaming generation.
    async fn generate(&self, messages: &[Message], opts: &GenerateOptions) -> Result<ModelOutput>;

    /// Start a streaming generation. Deltas are pulled lazily; dropping the
    /// stream stops requesting further tokens.
    async fn stream(&self, messages: &[Message], opts: &GenerateOptions) -> Result<DeltaStream>;
}

/// Builds a [`ModelClient`] for a specific model.
pub trait ClientFactory: Send + Sync {
    fn build(&self, model: &str) -> Result<Box<dyn ModelClient>>;
}

enum ProviderEntry {
    Enabled(Box<dyn ClientFactory>),
    /// Known backend that is deliberately disabled.
    Disabled,
}

/// Registry mapping provider identifiers to client factories.
pub struct ProviderRegistry {
    entries: HashMap<String, ProviderEntry>,
}

impl ProviderRegistry {
    /// An empty registry; used by tests to install stub factories.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a factory under a provider identifier (stored lowercase).
    pub fn register(&mut self, provider: &str, factory: Box<dyn ClientFactory>) {
        self.entries
            .insert(provider.to_lowercase(), ProviderEntry::Enabled(factory));
    }

    /// Register a provider that is recognized but deliberately disabled.
    pub fn register_disabled(&mut self, provider: &str) {
        self.entries
            .insert(provider.to_lowercase(), ProviderEntry::Disabled);
    }

    /// Resolve a provider identifier (case-insensitive) to a model client.
    ///
    /// Unknown identifiers fail with [`Error::UnsupportedProvider`]; known
    /// but disabled ones with the distinct [`Error::ProviderNotImplemented`].
    /// There is never a fallback to a default provider.
    pub fn resolve(&self, provider: &str, model: &str) -> Result<Box<dyn ModelClient>> {
        match self.entries.get(&provider.to_lowercase()) {
            Some(ProviderEntry::Enabled(factory)) => factory.build(model),
            Some(ProviderEntry::Disabled) => Err(Error::ProviderNotImplemented {
                provider: provider.to_string(),
            }),
            None => Err(Error::UnsupportedProvider {
                provider: provider.to_string(),
            }),
        }
    }

    /// Registry with all builtin providers.
    ///
    /// Credentials are resolved lazily at client construction from `env`,
    /// one named variable per provider.
    pub fn builtin(http: reqwest::Client, env: EnvLookup) -> Self {
        let mut registry = Self::new();

        registry.register(
            "openai",
            Box::new(OpenAiCompatFactory::new(
                http.clone(),
                env.clone(),
                "openai",
                OPENAI_BASE_URL,
                Some("OPENAI_API_KEY"),
            )),
        );
        registry.register(
            "groq",
            Box::new(OpenAiCompatFactory::new(
                http.clone(),
                env.clone(),
                "groq",
                "https://api.groq.com/openai/v1",
                Some("GROQ_API_KEY"),
            )),
        );
        registry.register(
            "mistral",
            Box::new(OpenAiCompatFactory::new(
                http.clone(),
                env.clone(),
                "mistral",
                "https://api.mistral.ai/v1",
                Some("MISTRAL_API_KEY"),
            )),
        );
        registry.register(
            "cohere",
            Box::new(OpenAiCompatFactory::new(
                http.clone(),
                env.clone(),
                "cohere",
                "https://api.cohere.ai/compatibility/v1",
                Some("COHERE_API_KEY"),
            )),
        );
        registry.register(
            "ollama",
            Box::new(OpenAiCompatFactory::new(
                http.clone(),
                env.clone(),
                "ollama",
                "http://localhost:11434/v1",
                None,
            )),
        );
        registry.register(
            "openrouter",
            Box::new(
                OpenAiCompatFactory::new(
                    http.clone(),
                    env.clone(),
                    "openrouter",
                    "https://openrouter.ai/api/v1",
                    Some("OPENROUTER_API_KEY"),
                )
                .with_header("HTTP-Referer", "https://github.com/llmlens/llmlens")
                .with_header("X-Title", "llmlens"),
            ),
        );
        registry.register(
            "anthropic",
            Box::new(AnthropicFactory::new(http.clone(), env.clone(), false)),
        );
        registry.register(
            "anthropiccached",
            Box::new(AnthropicFactory::new(http, env, true)),
        );

        // Planned backend, deliberately disabled
        registry.register_disabled("google-vertex");

        registry
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct StubClient;

    #[async_trait]
    impl ModelClient for StubClient {
        async fn generate(
            &self,
            _messages: &[Message],
            _opts: &GenerateOptions,
        ) -> Result<ModelOutput> {
            Ok(ModelOutput {
                text: "stub".to_string(),
                usage: None,
                finish_reason: None,
            })
        }

        async fn stream(
            &self,
            _messages: &[Message],
            _opts: &GenerateOptions,
        ) -> Result<DeltaStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    struct StubFactory;

    impl ClientFactory for StubFactory {
        fn build(&self, _model: &str) -> Result<Box<dyn ModelClient>> {
            Ok(Box::new(StubClient))
        }
    }

    fn fixed_env(pairs: &[(&str, &str)]) -> EnvLookup {
        let owned: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(move |name| {
            owned
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        })
    }

    #[test]
    fn test_resolve_case_insensitive() {
        let mut registry = ProviderRegistry::new();
        registry.register("openai", Box::new(StubFactory));

        assert!(registry.resolve("openai", "gpt-4o").is_ok());
        assert!(registry.resolve("OPENAI", "gpt-4o").is_ok());
        assert!(registry.resolve("OpenAI", "gpt-4o").is_ok());
    }

    #[test]
    fn test_resolve_unknown_provider() {
        let registry = ProviderRegistry::new();
        let err = registry
            .resolve("nonexistent-provider", "x")
            .map(|_| ())
            .unwrap_err();
        match err {
            Error::UnsupportedProvider { provider } => {
                assert_eq!(provider, "nonexistent-provider")
            }
            other => panic!("expected UnsupportedProvider, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_disabled_provider_is_distinct() {
        let mut registry = ProviderRegistry::new();
        registry.register_disabled("google-vertex");

        let err = registry
            .resolve("google-vertex", "gemini-pro")
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, Error::ProviderNotImplemented { .. }));
    }

    #[test]
    fn test_builtin_missing_credential_fails_construction() {
        let registry = ProviderRegistry::builtin(reqwest::Client::new(), fixed_env(&[]));
        let err = registry.resolve("openai", "gpt-4o").map(|_| ()).unwrap_err();
        match err {
            Error::MissingCredential { provider, var } => {
                assert_eq!(provider, "openai");
                assert_eq!(var, "OPENAI_API_KEY");
            }
            other => panic!("expected MissingCredential, got {:?}", other),
        }
    }

    #[test]
    fn test_builtin_ollama_needs_no_credential() {
        let registry = ProviderRegistry::builtin(reqwest::Client::new(), fixed_env(&[]));
        assert!(registry.resolve("ollama", "llama3.1").is_ok());
    }

    #[test]
    fn test_builtin_google_vertex_disabled() {
        let registry = ProviderRegistry::builtin(reqwest::Client::new(), fixed_env(&[]));
        let err = registry
            .resolve("google-vertex", "gemini-pro")
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, Error::ProviderNotImplemented { .. }));
    }

    #[test]
    fn test_builtin_cached_variant_resolves_with_anthropic_key() {
        let env = fixed_env(&[("ANTHROPIC_API_KEY", "sk-ant-test")]);
        let registry = ProviderRegistry::builtin(reqwest::Client::new(), env);
        assert!(registry
            .resolve("anthropicCached", "claude-3-5-sonnet-20240620")
            .is_ok());
    }
}
