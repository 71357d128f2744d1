//! OpenAI-compatible Chat Completions provider (OpenAI, Groq, OpenRouter, Ollama)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{LlmProvider, build_http_client, error_from_response};
use crate::{
    error::{Error, Result},
    types::{Completion, CompletionRequest, Model, StopReason, Usage},
};

/// Chat Completions client. The key is optional for local servers.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl OpenAIProvider {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            api_key,
        })
    }
}

fn build_request(model: &Model, request: &CompletionRequest) -> OpenAIRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(ref system_prompt) = request.system_prompt {
        messages.push(OpenAIMessage {
            role: "system".to_string(),
            content: Some(system_prompt.clone()),
        });
    }
    messages.push(OpenAIMessage {
        role: "user".to_string(),
        content: Some(request.prompt.clone()),
    });

    OpenAIRequest {
        model: model.id.clone(),
        messages,
        max_tokens: Some(request.max_tokens.unwrap_or(model.max_tokens)),
        temperature: request.temperature,
    }
}

fn into_completion(response: OpenAIResponse) -> Result<Completion> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::UnexpectedResponse("response contained no choices".to_string()))?;

    let stop_reason = match choice.finish_reason.as_deref() {
        Some("stop") => StopReason::Stop,
        Some("length") => StopReason::Length,
        _ => StopReason::Other,
    };

    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        usage: response
            .usage
            .map(|u| Usage {
                input: u.prompt_tokens,
                output: u.completion_tokens,
            })
            .unwrap_or_default(),
        stop_reason,
    })
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn complete(&self, model: &Model, request: &CompletionRequest) -> Result<Completion> {
        let url = format!("{}/chat/completions", model.base_url);
        tracing::debug!("Chat completions URL: {}", url);

        let mut builder = self.client.post(&url).json(&build_request(model, request));
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }
        for (key, value) in &model.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: OpenAIResponse = response.json().await?;
        into_completion(body)
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}
