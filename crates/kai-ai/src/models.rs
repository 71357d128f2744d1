//! Model registry and tier defaults.

use crate::{Error, Model, Provider, Result, Tier};

struct ModelEntry {
    id: &'static str,
    provider: Provider,
    max_tokens: u32,
}

const MODEL_ENTRIES: &[ModelEntry] = &[
    ModelEntry {
        id: "claude-sonnet-4-5-20250929",
        provider: Provider::Anthropic,
        max_tokens: 64000,
    },
    ModelEntry {
        id: "claude-haiku-4-5-20251001",
        provider: Provider::Anthropic,
        max_tokens: 64000,
    },
    ModelEntry {
        id: "claude-opus-4-1-20250805",
        provider: Provider::Anthropic,
        max_tokens: 32000,
    },
    ModelEntry {
        id: "gpt-4.1",
        provider: Provider::OpenAI,
        max_tokens: 32768,
    },
    ModelEntry {
        id: "gpt-4.1-mini",
        provider: Provider::OpenAI,
        max_tokens: 32768,
    },
    ModelEntry {
        id: "llama-3.3-70b-versatile",
        provider: Provider::Groq,
        max_tokens: 32768,
    },
];

/// Output limit used for models the registry does not know about
const FALLBACK_MAX_TOKENS: u32 = 8192;

/// Default model id for a provider and tier, when one is known.
pub fn default_model_id(provider: Provider, tier: Tier) -> Option<&'static str> {
    match (provider, tier) {
        (Provider::Anthropic, Tier::Quality) => Some("claude-sonnet-4-5-20250929"),
        (Provider::Anthropic, Tier::Fast) => Some("claude-haiku-4-5-20251001"),
        (Provider::OpenAI, Tier::Quality) => Some("gpt-4.1"),
        (Provider::OpenAI, Tier::Fast) => Some("gpt-4.1-mini"),
        (Provider::Groq, _) => Some("llama-3.3-70b-versatile"),
        _ => None,
    }
}

/// Build a model definition for `id`.
///
/// Known ids take their output limit from the registry; unknown ids are
/// accepted with a conservative limit so custom deployments keep working.
/// `base_url` overrides the provider default and is required for providers
/// without a well-known endpoint.
pub fn resolve_model(provider: Provider, id: &str, base_url: Option<&str>) -> Result<Model> {
    let base_url = match base_url.or(provider.default_base_url()) {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => {
            return Err(Error::InvalidConfig(format!(
                "provider {} needs an explicit base_url",
                provider.name()
            )));
        }
    };

    let max_tokens = MODEL_ENTRIES
        .iter()
        .find(|e| e.id == id && e.provider == provider)
        .map(|e| e.max_tokens)
        .unwrap_or(FALLBACK_MAX_TOKENS);

    Ok(Model {
        id: id.to_string(),
        provider,
        base_url,
        max_tokens,
        headers: Default::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_model() {
        let model = resolve_model(Provider::Anthropic, "claude-sonnet-4-5-20250929", None).unwrap();
        assert_eq!(model.base_url, "https://api.anthropic.com");
        assert_eq!(model.max_tokens, 64000);
    }

    #[test]
    fn test_resolve_unknown_model_uses_fallback_limit() {
        let model = resolve_model(Provider::Ollama, "qwen2.5-coder", None).unwrap();
        assert_eq!(model.max_tokens, FALLBACK_MAX_TOKENS);
        assert_eq!(model.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_resolve_custom_requires_base_url() {
        assert!(resolve_model(Provider::Custom, "m", None).is_err());
        let model = resolve_model(Provider::Custom, "m", Some("http://host:9000/v1/")).unwrap();
        assert_eq!(model.base_url, "http://host:9000/v1");
    }

    #[test]
    fn test_default_model_ids() {
        assert!(default_model_id(Provider::Anthropic, Tier::Fast).is_some());
        assert!(default_model_id(Provider::Custom, Tier::Quality).is_none());
    }
}
