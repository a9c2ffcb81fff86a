//! OpenAI-compatible chat-completion client.
//!
//! Works with any server exposing `/v1/chat/completions` (llama.cpp,
//! llama-swap, vLLM, hosted proxies). The model is chosen per request so one
//! client serves every model under test and the evaluator.

use crate::config::Config;
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Message role in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Request body for chat completion.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Response from chat completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Anything that can answer a chat completion for a named model.
///
/// `LlmClient` is the network implementation; the pipeline only depends on
/// this trait.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `messages` to `model` and return the reply text, trimmed.
    async fn chat(&self, model: &str, messages: Vec<Message>) -> Result<String>;

    /// Send `prompt` as the sole user message and time the round trip.
    ///
    /// Elapsed time is measured even when the request fails.
    async fn infer(&self, model: &str, prompt: &str) -> (Result<String>, Duration) {
        let start = Instant::now();
        let outcome = self.chat(model, vec![Message::user(prompt)]).await;
        (outcome, start.elapsed())
    }
}

/// OpenAI-compatible LLM client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    endpoint_url: String,
    api_key: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl LlmClient {
    /// Create a new LLM client from the run configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint_url: config.endpoint_url.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// The chat-completion URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint_url
    }

    fn parse_completion(status: reqwest::StatusCode, body: &str) -> Result<(String, Option<String>)> {
        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiError>(body) {
                return Err(BenchError::LlmApi(format!(
                    "API error ({}): {}",
                    status, api_error.error.message
                )));
            }
            return Err(BenchError::LlmApi(format!(
                "Request failed ({}): {}",
                status, body
            )));
        }

        let completion: ChatCompletionResponse = serde_json::from_str(body)?;

        if let Some(usage) = &completion.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "token usage"
            );
        }

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BenchError::LlmApi("No choices in response".to_string()))?;

        Ok((
            choice.message.content.unwrap_or_default().trim().to_string(),
            choice.finish_reason,
        ))
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(&self, model: &str, messages: Vec<Message>) -> Result<String> {
        let request = ChatCompletionRequest {
            model,
            messages,
            stream: false,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut builder = self
            .client
            .post(&self.endpoint_url)
            .header("Content-Type", "application/json")
            .json(&request);

        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let (content, finish_reason) = Self::parse_completion(status, &body)?;
        debug!(model, ?finish_reason, "completion received");
        Ok(content)
    }
}
