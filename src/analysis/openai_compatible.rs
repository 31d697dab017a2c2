use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde_json::{Value, json};

use crate::{
    analysis::ReasoningBackend,
    config::LlmConfig,
    error::{RcaError, configuration_error, llm_error, truncate_body},
    prompt::RcaPrompt,
};

/// Chat-completions backend for OpenAI and API-compatible providers.
pub struct OpenAiCompatibleBackend {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f64,
    max_output_tokens: Option<u32>,
    timeout: Duration,
}

impl OpenAiCompatibleBackend {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self, RcaError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| configuration_error(format!("failed to build llm http client: {err}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    fn request_body(&self, prompt: &RcaPrompt) -> Value {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": prompt.system_instruction},
                {"role": "user", "content": prompt.context},
            ],
            "response_format": {"type": "json_object"},
        });
        if let Some(max_tokens) = self.max_output_tokens {
            body["max_tokens"] = Value::Number(max_tokens.into());
        }
        body
    }
}

#[async_trait]
impl ReasoningBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &'static str {
        "openai_compatible"
    }

    async fn complete(&self, prompt: &RcaPrompt) -> Result<String, RcaError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|err| {
                let message = if err.is_timeout() {
                    "llm request timed out".to_string()
                } else {
                    format!("llm request failed: {err}")
                };
                llm_error(message).with_retryable(true)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_llm_status(status, &body));
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(|err| llm_error(format!("llm response body decode failed: {err}")))?;
        extract_completion_text(&payload)
    }
}

pub(crate) fn map_llm_status(status: StatusCode, body: &str) -> RcaError {
    let code = status.as_u16();
    let retryable = matches!(code, 408 | 429 | 500..=599);
    let detail = truncate_body(body);
    let message = if detail.is_empty() {
        format!("llm provider returned status {code}")
    } else {
        format!("llm provider returned status {code}: {detail}")
    };
    llm_error(message)
        .with_retryable(retryable)
        .with_http_status(code)
}

pub(crate) fn extract_completion_text(payload: &Value) -> Result<String, RcaError> {
    let message = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| llm_error("llm response is missing choices"))?;

    if let Some(refusal) = message.get("refusal").and_then(Value::as_str) {
        return Err(llm_error(format!(
            "model refused the request: {}",
            truncate_body(refusal)
        )));
    }

    message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| llm_error("llm response has no text content"))
}
