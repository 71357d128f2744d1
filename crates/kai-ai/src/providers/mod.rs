//! Provider implementations

pub mod anthropic;
pub mod openai;

use crate::{Api, Completion, CompletionRequest, Error, Model, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Trait for completion providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run a single non-streaming completion
    async fn complete(&self, model: &Model, request: &CompletionRequest) -> Result<Completion>;
}

/// Get an API key from the provided value or the environment
pub fn get_api_key(provided: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = provided {
        return Ok(key.to_string());
    }

    std::env::var(env_var).map_err(|_| Error::InvalidApiKey)
}

/// Build the provider speaking `model`'s wire format.
pub fn provider_for(
    model: &Model,
    api_key: Option<&str>,
    timeout: Duration,
) -> Result<Box<dyn LlmProvider>> {
    let key = match model.provider.api_key_env_var() {
        Some(env_var) => Some(get_api_key(api_key, env_var)?),
        None => api_key.map(str::to_string),
    };

    match model.api() {
        Api::AnthropicMessages => {
            let key = key.ok_or(Error::InvalidApiKey)?;
            Ok(Box::new(anthropic::AnthropicProvider::new(key, timeout)?))
        }
        Api::OpenAICompletions => Ok(Box::new(openai::OpenAIProvider::new(key, timeout)?)),
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Map a non-success HTTP response to a typed error.
///
/// Both supported APIs wrap failures as `{"error": {"type"|"code", "message"}}`.
pub(crate) async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status();

    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return Error::RateLimited { retry_after };
    }

    let body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<serde_json::Value>(&body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let error_type = error
        .and_then(|e| e.get("type").or_else(|| e.get("code")))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| {
            if status.is_server_error() {
                "server_error".to_string()
            } else {
                format!("http_{}", status.as_u16())
            }
        });
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or(body);

    Error::api(error_type, format!("{} ({})", message, status))
}
