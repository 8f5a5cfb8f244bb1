//! Gemini `generateContent` client.
//!
//! Sends the RAG prompt to `POST {endpoint}/v1beta/models/{model}:generateContent`
//! with the API key in the `x-goog-api-key` header. A single attempt is
//! made per request.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use support_rag_core::generation::{GenerationParams, TextGenerator};

use crate::config::LlmConfig;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),
    #[error("request to generative model failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("generative model returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("invalid generative model response: {0}")]
    InvalidResponse(String),
}

pub struct GeminiGenerator {
    model: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self, GeneratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// Build a client using the key from `config.api_key_env`.
    pub fn from_env(config: &LlmConfig) -> Result<Self, GeneratorError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| GeneratorError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }

    async fn call(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Option<String>, GeneratorError> {
        let body = request_body(prompt, params);
        debug!(model = %self.model, prompt_chars = prompt.len(), "sending generation request");

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;
        parse_response(&json)
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> anyhow::Result<Option<String>> {
        Ok(self.call(prompt, params).await?)
    }
}

fn request_body(prompt: &str, params: &GenerationParams) -> serde_json::Value {
    serde_json::json!({
        "contents": [
            { "role": "user", "parts": [ { "text": prompt } ] }
        ],
        "generationConfig": {
            "temperature": params.temperature,
            "maxOutputTokens": params.max_output_tokens,
            "topP": params.top_p,
            "topK": params.top_k,
        }
    })
}

/// Concatenate every `candidates[].content.parts[].text`.
///
/// Returns `None` when the response carries no text (e.g. a blocked
/// prompt or an empty candidate list).
fn parse_response(json: &serde_json::Value) -> Result<Option<String>, GeneratorError> {
    if !json.is_object() {
        return Err(GeneratorError::InvalidResponse(
            "expected a JSON object".to_string(),
        ));
    }

    let text: String = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .into_iter()
        .flatten()
        .filter_map(|candidate| candidate.pointer("/content/parts"))
        .filter_map(|parts| parts.as_array())
        .flatten()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(text))
    }
}
