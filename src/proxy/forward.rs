//! Request forwarding: active configuration + inbound request -> provider call.

use crate::error::Result;
use crate::providers::{DeltaStream, GenerateOptions, ModelOutput, ProviderRegistry};
use crate::storage::ProviderConfiguration;

use super::types::{ChatCompletionRequest, Message};

/// Message name that explicitly requests the prompt-cache marker.
const CACHE_FLAG_NAME: &str = "potential_context";

/// Providers that reject requests without an explicit token cap.
const CAPPED_PROVIDERS: &[&str] = &["anthropic", "anthropiccached"];
const FORCED_MAX_TOKENS: u32 = 8192;

/// Outcome of forwarding one request.
pub enum Forwarded {
    Complete(ModelOutput),
    Stream(DeltaStream),
}

/// Forward an inbound request through the active configuration.
///
/// The inbound `model` field is ignored for routing; provider, model, and
/// sampling parameters all come from `config`.
pub async fn forward(
    config: &ProviderConfiguration,
    request: &ChatCompletionRequest,
    registry: &ProviderRegistry,
) -> Result<Forwarded> {
    let client = registry.resolve(&config.provider, &config.model)?;
    let opts = generate_options(config);

    let mut messages = request.messages.clone();
    if config.provider.eq_ignore_ascii_case("anthropiccached") {
        mark_cached_messages(&mut messages);
    }

    if request.stream {
        let stream = client.stream(&messages, &opts).await?;
        Ok(Forwarded::Stream(stream))
    } else {
        let output = client.generate(&messages, &opts).await?;
        Ok(Forwarded::Complete(output))
    }
}

/// Sampling options from the stored configuration.
///
/// Providers that require a cap get one even when the configuration has
/// none, overriding the stored value.
fn generate_options(config: &ProviderConfiguration) -> GenerateOptions {
    let capped = CAPPED_PROVIDERS
        .iter()
        .any(|p| config.provider.eq_ignore_ascii_case(p));

    GenerateOptions {
        temperature: config.temperature,
        max_tokens: if capped {
            Some(FORCED_MAX_TOKENS)
        } else {
            config.max_tokens.map(|m| m as u32)
        },
        top_p: config.top_p,
        frequency_penalty: config.frequency_penalty,
        presence_penalty: config.presence_penalty,
    }
}

/// Choose which messages carry the prompt-cache marker.
///
/// Messages named `potential_context` are marked. When the caller flags
/// none and the conversation has at least two messages, the second one is
/// marked as a best-effort guess at the shared context block.
fn mark_cached_messages(messages: &mut [Message]) {
    let mut any_flagged = false;
    for message in messages.iter_mut() {
        if message.name.as_deref() == Some(CACHE_FLAG_NAME) {
            message.cache_marked = true;
            any_flagged = true;
        }
    }
    if !any_flagged && messages.len() >= 2 {
        messages[1].cache_marked = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, max_tokens: Option<i64>) -> ProviderConfiguration {
        ProviderConfiguration {
            id: 1,
            name: "test".to_string(),
            provider: provider.to_string(),
            model: "m".to_string(),
            temperature: Some(0.5),
            max_tokens,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            is_default: true,
        }
    }

    #[test]
    fn test_flagged_messages_are_marked() {
        let mut flagged = Message::user("shared context");
        flagged.name = Some(CACHE_FLAG_NAME.to_string());
        let mut messages = vec![Message::system("sys"), Message::user("q"), flagged];

        mark_cached_messages(&mut messages);

        assert!(!messages[0].cache_marked);
        assert!(!messages[1].cache_marked);
        assert!(messages[2].cache_marked);
    }

    #[test]
    fn test_fallback_marks_second_message() {
        let mut messages = vec![
            Message::system("sys"),
            Message::user("context dump"),
            Message::user("question"),
        ];
        mark_cached_messages(&mut messages);
        assert!(!messages[0].cache_marked);
        assert!(messages[1].cache_marked);
        assert!(!messages[2].cache_marked);
    }

    #[test]
    fn test_no_fallback_below_two_messages() {
        let mut messages = vec![Message::user("only")];
        mark_cached_messages(&mut messages);
        assert!(!messages[0].cache_marked);
    }

    #[test]
    fn test_token_cap_forced_for_capped_providers() {
        let opts = generate_options(&config("anthropic", Some(256)));
        assert_eq!(opts.max_tokens, Some(FORCED_MAX_TOKENS));

        let opts = generate_options(&config("anthropicCached", None));
        assert_eq!(opts.max_tokens, Some(FORCED_MAX_TOKENS));
    }

    #[test]
    fn test_token_cap_passthrough_otherwise() {
        let opts = generate_options(&config("openai", Some(256)));
        assert_eq!(opts.max_tokens, Some(256));

        let opts = generate_options(&config("openai", None));
        assert_eq!(opts.max_tokens, None);
    }
}
