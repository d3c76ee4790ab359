//! Built-in model catalog.
//!
//! Maps (provider, model) to default sampling parameters and launch prices.
//! Template entries carry a full parameter set and are used to fill in
//! fields a configuration leaves unset; priced entries seed the cost table
//! on first startup.

/// A catalog entry for one (provider, model) pair.
///
/// Prices are USD per one million tokens. Entries without prices exist only
/// so the model is known; they never seed the cost table.
#[derive(Debug, Clone, Copy)]
pub struct ModelTemplate {
    pub provider: &'static str,
    pub model: &'static str,
    pub name: Option<&'static str>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub input_token_cost: Option<f64>,
    pub output_token_cost: Option<f64>,
    pub is_template: bool,
}

impl ModelTemplate {
    const fn priced(
        provider: &'static str,
        model: &'static str,
        input_token_cost: f64,
        output_token_cost: f64,
    ) -> Self {
        Self {
            provider,
            model,
            name: None,
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            input_token_cost: Some(input_token_cost),
            output_token_cost: Some(output_token_cost),
            is_template: false,
        }
    }

    const fn template_unpriced(
        provider: &'static str,
        model: &'static str,
        name: &'static str,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            model,
            name: Some(name),
            temperature: Some(0.7),
            max_tokens: Some(max_tokens),
            top_p: Some(1.0),
            frequency_penalty: Some(0.0),
            presence_penalty: Some(0.0),
            input_token_cost: None,
            output_token_cost: None,
            is_template: true,
        }
    }

    const fn template(
        provider: &'static str,
        model: &'static str,
        name: &'static str,
        max_tokens: u32,
        input_token_cost: f64,
        output_token_cost: f64,
    ) -> Self {
        Self {
            provider,
            model,
            name: Some(name),
            temperature: Some(0.7),
            max_tokens: Some(max_tokens),
            top_p: Some(1.0),
            frequency_penalty: Some(0.0),
            presence_penalty: Some(0.0),
            input_token_cost: Some(input_token_cost),
            output_token_cost: Some(output_token_cost),
            is_template: true,
        }
    }
}

/// The full built-in catalog.
pub const MODEL_CATALOG: &[ModelTemplate] = &[
    // OpenAI
    ModelTemplate::template("openai", "gpt-4o", "OpenAI GPT-4 Optimized", 8192, 5.0, 15.0),
    ModelTemplate::template("openai", "gpt-4o-mini", "OpenAI GPT-4 Mini", 4096, 0.15, 0.6),
    ModelTemplate::template("openai", "gpt-4-turbo", "OpenAI GPT-4 Turbo", 8192, 10.0, 30.0),
    ModelTemplate::priced("openai", "gpt-4o-2024-08-06", 2.5, 10.0),
    ModelTemplate::priced("openai", "chatgpt-4o-latest", 5.0, 15.0),
    ModelTemplate::priced("openai", "gpt-4", 30.0, 60.0),
    ModelTemplate::priced("openai", "gpt-4-32k", 60.0, 120.0),
    ModelTemplate::priced("openai", "gpt-3.5-turbo-0125", 0.5, 1.5),
    ModelTemplate::priced("openai", "gpt-3.5-turbo-instruct", 1.5, 2.0),
    // Anthropic (plain and prompt-cached variants share prices)
    ModelTemplate::template(
        "anthropic",
        "claude-3-5-sonnet-20240620",
        "Anthropic Claude 3.5 Sonnet",
        8192,
        3.0,
        15.0,
    ),
    ModelTemplate::template(
        "anthropiccached",
        "claude-3-5-sonnet-20240620",
        "Anthropic Claude 3.5 Sonnet (Cached)",
        8192,
        3.0,
        15.0,
    ),
    ModelTemplate::priced("anthropic", "claude-3-5-sonnet", 3.0, 15.0),
    ModelTemplate::priced("anthropic", "claude-3-opus", 15.0, 75.0),
    ModelTemplate::priced("anthropic", "claude-3-haiku", 0.25, 1.25),
    ModelTemplate::priced("anthropic", "claude-2-1", 8.0, 24.0),
    ModelTemplate::priced("anthropic", "claude-2-0", 8.0, 24.0),
    ModelTemplate::priced("anthropic", "claude-instant", 0.8, 2.4),
    // Mistral and Groq have no published launch prices in the catalog;
    // leaving them unpriced keeps the price-miss warning visible
    ModelTemplate::template_unpriced("mistral", "mistral-large-latest", "Mistral Large", 32768),
    ModelTemplate::template_unpriced("groq", "llama-3.1-70b-versatile", "Groq LLaMA 3.1", 32768),
    // OpenRouter (gateway prices mirror the upstream vendor)
    ModelTemplate::priced("openrouter", "openai/gpt-4o", 5.0, 15.0),
    ModelTemplate::priced("openrouter", "openai/gpt-4o-mini", 0.15, 0.6),
    ModelTemplate::priced("openrouter", "openai/gpt-4-turbo", 10.0, 30.0),
    ModelTemplate::priced("openrouter", "anthropic/claude-3.5-sonnet", 3.0, 15.0),
    ModelTemplate::priced("openrouter", "anthropic/claude-3-opus", 15.0, 75.0),
    ModelTemplate::priced("openrouter", "anthropic/claude-3-haiku", 0.25, 1.25),
    ModelTemplate::priced("openrouter", "google/gemini-flash-1.5", 0.0375, 0.15),
    ModelTemplate::priced("openrouter", "google/gemini-pro-1.5", 2.5, 7.5),
    ModelTemplate::priced("openrouter", "meta-llama/llama-3.1-405b-instruct", 2.7, 2.7),
    ModelTemplate::priced("openrouter", "meta-llama/llama-3.1-70b-instruct", 0.35, 0.4),
    ModelTemplate::priced("openrouter", "meta-llama/llama-3.1-8b-instruct", 0.055, 0.055),
    ModelTemplate::priced("openrouter", "mistralai/mistral-large", 3.0, 9.0),
    ModelTemplate::priced("openrouter", "mistralai/mistral-nemo", 0.17, 0.17),
    ModelTemplate::priced("openrouter", "deepseek/deepseek-chat", 0.14, 0.28),
    ModelTemplate::priced("openrouter", "cohere/command-r", 0.5, 1.5),
    ModelTemplate::priced("openrouter", "cohere/command-r-plus", 3.0, 15.0),
];

/// Look up the template entry for a (provider, model) pair.
///
/// Provider comparison is case-insensitive to match client resolution.
pub fn find_template(provider: &str, model: &str) -> Option<&'static ModelTemplate> {
    MODEL_CATALOG
        .iter()
        .find(|t| t.provider.eq_ignore_ascii_case(provider) && t.model == model && t.is_template)
}

/// All entries with prices, for seeding the cost table.
pub fn priced_entries() -> impl Iterator<Item = &'static ModelTemplate> {
    MODEL_CATALOG
        .iter()
        .filter(|t| t.input_token_cost.is_some() && t.output_token_cost.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_template_case_insensitive_provider() {
        let lower = find_template("openai", "gpt-4o").unwrap();
        let upper = find_template("OPENAI", "gpt-4o").unwrap();
        assert_eq!(lower.model, upper.model);
        assert_eq!(lower.max_tokens, Some(8192));
    }

    #[test]
    fn test_find_template_ignores_non_templates() {
        // Priced but not a template
        assert!(find_template("openai", "gpt-4").is_none());
    }

    #[test]
    fn test_priced_entries_all_have_both_costs() {
        for entry in priced_entries() {
            assert!(entry.input_token_cost.is_some(), "{}", entry.model);
            assert!(entry.output_token_cost.is_some(), "{}", entry.model);
        }
    }

    #[test]
    fn test_unpriced_templates_excluded_from_seeding() {
        assert!(find_template("mistral", "mistral-large-latest").is_some());
        assert!(!priced_entries()
            .any(|t| t.provider == "mistral" || t.provider == "groq"));
    }

    #[test]
    fn test_catalog_has_expected_launch_prices() {
        let mini = MODEL_CATALOG
            .iter()
            .find(|t| t.provider == "openai" && t.model == "gpt-4o-mini")
            .unwrap();
        assert_eq!(mini.input_token_cost, Some(0.15));
        assert_eq!(mini.output_token_cost, Some(0.6));
    }
}
