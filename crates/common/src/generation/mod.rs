//! Text-generation service abstraction
//!
//! Wraps chat-completion providers behind a narrow capability trait used by
//! the retrieval engine for structured extraction (date analysis, query
//! expansion). The production client targets OpenAI-compatible
//! `/chat/completions` endpoints.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged message in a chat exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Trait for text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for the given messages
    async fn generate(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

#[async_trait]
impl TextGenerator for Arc<dyn TextGenerator> {
    async fn generate(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        (**self).generate(messages, temperature).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// OpenAI chat-completions client
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiGenerator {
    /// Create a new OpenAI generator
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            timeout,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature,
        };

        let response = self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::GenerationTimeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    AppError::GenerationError {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited {
                provider: "openai-chat".to_string(),
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GenerationError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: ChatResponse = response.json().await.map_err(|e| {
            AppError::MalformedResponse {
                message: format!("Failed to parse chat response: {}", e),
            }
        })?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::MalformedResponse {
                message: "Chat response contained no choices".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock generator for testing; replays queued responses in order
pub struct MockGenerator {
    responses: Mutex<VecDeque<String>>,
}

impl MockGenerator {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, _messages: &[ChatMessage], _temperature: f32) -> Result<String> {
        let mut queue = self.responses.lock().expect("mock generator lock");
        queue.pop_front().ok_or_else(|| AppError::GenerationError {
            message: "Mock generator exhausted".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "mock-generation"
    }
}

/// Create a generator based on configuration
pub fn create_generator(config: &crate::config::GenerationConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "Generation API key required for provider 'openai'".to_string(),
            })?;
            Ok(Arc::new(OpenAiGenerator::new(
                key,
                config.model.clone(),
                config.api_base.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "mock" => Ok(Arc::new(MockGenerator::new(Vec::new()))),
        other => {
            tracing::warn!(provider = other, "Unknown generation provider, using mock");
            Ok(Arc::new(MockGenerator::new(Vec::new())))
        }
    }
}
