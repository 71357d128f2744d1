//! The `complete(prompt, tier) -> text` seam used by the rest of kai.

use async_trait::async_trait;

use crate::{CompletionRequest, Model, Result, Tier, providers::LlmProvider};

/// A text-completion service.
///
/// Implementations return only the response text; errors are classified
/// through [`crate::Error::is_retryable`].
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str, tier: Tier) -> Result<String>;
}

/// [`CompletionClient`] backed by a provider, with one model per tier.
pub struct ProviderClient {
    provider: Box<dyn LlmProvider>,
    fast: Model,
    quality: Model,
    system_prompt: Option<String>,
    temperature: Option<f32>,
}

impl ProviderClient {
    pub fn new(provider: Box<dyn LlmProvider>, fast: Model, quality: Model) -> Self {
        Self {
            provider,
            fast,
            quality,
            system_prompt: None,
            temperature: None,
        }
    }

    /// Set the system prompt sent with every request
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Model used for a tier
    pub fn model(&self, tier: Tier) -> &Model {
        match tier {
            Tier::Fast => &self.fast,
            Tier::Quality => &self.quality,
        }
    }
}

#[async_trait]
impl CompletionClient for ProviderClient {
    async fn complete(&self, prompt: &str, tier: Tier) -> Result<String> {
        let model = self.model(tier);
        let request = CompletionRequest {
            system_prompt: self.system_prompt.clone(),
            prompt: prompt.to_string(),
            max_tokens: None,
            temperature: self.temperature,
        };

        let completion = self.provider.complete(model, &request).await?;
        tracing::debug!(
            model = %model.id,
            tier = tier.as_str(),
            input_tokens = completion.usage.input,
            output_tokens = completion.usage.output,
            "completion finished"
        );
        if completion.stop_reason == crate::StopReason::Length {
            tracing::warn!("Completion from {} hit the output token limit", model.id);
        }

        Ok(completion.text)
    }
}
