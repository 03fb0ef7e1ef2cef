use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub mod prompts;

use crate::config::LlmConfig;

/// Seam for LLM completions. Every call is expected to return a single
/// JSON document matching the schema described in its prompt; fakes in
/// tests return canned JSON strings.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete_json(&self, system: &str, user: &str) -> Result<String>;
}

/// Client for an OpenAI-compatible chat completions endpoint
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl ChatCompletion for LlmClient {
    async fn complete_json(&self, system: &str, user: &str) -> Result<String> {
        if self.config.api_key.is_empty() {
            return Err(anyhow!("LLM api_key is not configured (set KS_LLM_API_KEY)"));
        }

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat { format_type: "json_object" },
        };

        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        debug!("LLM call - model={}, user_prompt_len={}", self.config.model, user.len());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM endpoint returned {}: {}", status, body));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("LLM response contained no choices"))?;

        Ok(strip_code_fences(&content).to_string())
    }
}

/// Strip markdown code fences some models wrap around JSON output
pub fn strip_code_fences(content: &str) -> &str {
    content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences_plain_json() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fences_json_block() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fences_bare_block() {
        assert_eq!(strip_code_fences("```\n[1, 2]\n```"), "[1, 2]");
    }
}
