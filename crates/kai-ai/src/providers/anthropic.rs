//! Anthropic Messages API provider

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{LlmProvider, build_http_client, error_from_response};
use crate::{
    error::{Error, Result},
    types::{Completion, CompletionRequest, Model, StopReason, Usage},
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic API client
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with an API key
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            api_key: api_key.into(),
        })
    }

    fn build_headers(&self, model: &Model) -> Result<reqwest::header::HeaderMap> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "x-api-key",
            self.api_key.parse().map_err(|_| Error::InvalidApiKey)?,
        );
        headers.insert(
            "anthropic-version",
            reqwest::header::HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(
            "content-type",
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        // Add model-specific headers
        for (key, value) in &model.headers {
            if let (Ok(name), Ok(val)) = (
                key.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                headers.insert(name, val);
            }
        }

        Ok(headers)
    }
}

fn build_request(model: &Model, request: &CompletionRequest) -> AnthropicRequest {
    AnthropicRequest {
        model: model.id.clone(),
        max_tokens: request.max_tokens.unwrap_or(model.max_tokens),
        system: request.system_prompt.clone(),
        temperature: request.temperature,
        messages: vec![AnthropicMessage {
            role: "user",
            content: request.prompt.clone(),
        }],
    }
}

fn into_completion(response: AnthropicResponse) -> Result<Completion> {
    let text: String = response
        .content
        .iter()
        .filter(|block| block.block_type == "text")
        .filter_map(|block| block.text.as_deref())
        .collect();

    if text.is_empty() && response.content.is_empty() {
        return Err(Error::UnexpectedResponse(
            "response contained no content blocks".to_string(),
        ));
    }

    let stop_reason = match response.stop_reason.as_deref() {
        Some("end_turn") | Some("stop_sequence") => StopReason::Stop,
        Some("max_tokens") => StopReason::Length,
        _ => StopReason::Other,
    };

    Ok(Completion {
        text,
        usage: Usage {
            input: response.usage.input_tokens,
            output: response.usage.output_tokens,
        },
        stop_reason,
    })
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, model: &Model, request: &CompletionRequest) -> Result<Completion> {
        let url = format!("{}/v1/messages", model.base_url);
        tracing::debug!("Anthropic API URL: {}", url);

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers(model)?)
            .json(&build_request(model, request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: AnthropicResponse = response.json().await?;
        into_completion(body)
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Provider;

    fn model() -> Model {
        Model {
            id: "claude-test".into(),
            provider: Provider::Anthropic,
            base_url: "http://localhost".into(),
            max_tokens: 4096,
            headers: Default::default(),
        }
    }

    #[test]
    fn test_build_request_defaults_max_tokens_to_model_limit() {
        let request = CompletionRequest::new("hello").with_system("be terse");
        let wire = build_request(&model(), &request);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["system"], "be terse");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_into_completion_joins_text_blocks() {
        let body: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "part one "},
                {"type": "thinking", "thinking": "hidden"},
                {"type": "text", "text": "part two"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 5}
        }))
        .unwrap();

        let completion = into_completion(body).unwrap();
        assert_eq!(completion.text, "part one part two");
        assert_eq!(completion.stop_reason, StopReason::Stop);
        assert_eq!(completion.usage.input, 12);
    }

    #[test]
    fn test_into_completion_rejects_empty_content() {
        let body: AnthropicResponse =
            serde_json::from_value(serde_json::json!({"content": [], "stop_reason": null}))
                .unwrap();
        assert!(matches!(
            into_completion(body),
            Err(Error::UnexpectedResponse(_))
        ));
    }
}
