use crate::history::Exchange;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that prioritizes answering in one sentence.";

/// Failures talking to the completion service.
///
/// The `Display` form of each variant is what the user hears, so the messages
/// are written to be spoken.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Error generating response: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Error generating response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Error generating response: {0}")]
    EmptyResponse(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Produces the assistant's reply to a question given the earlier exchanges.
///
/// Implementations never fail: a problem reaching the service comes back as
/// text describing it, because whatever is returned gets spoken.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, history: &[Exchange], question: &str) -> String;
}

/// Settings for `OpenAICompletionClient`.
pub struct CompletionConfig {
    api_base: String,
    api_key: SecretString,
    model: String,
    system_prompt: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

pub struct CompletionConfigBuilder {
    config: CompletionConfig,
}

impl CompletionConfigBuilder {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            config: CompletionConfig {
                api_base: DEFAULT_API_BASE.to_string(),
                api_key,
                model: DEFAULT_MODEL.to_string(),
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
                max_tokens: None,
                temperature: None,
            },
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.config.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: &str) -> Self {
        self.config.system_prompt = system_prompt.to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn build(self) -> CompletionConfig {
        self.config
    }
}

impl CompletionConfig {
    pub fn builder(api_key: SecretString) -> CompletionConfigBuilder {
        CompletionConfigBuilder::new(api_key)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

/// Assembles the prompt: system instruction, the replayed exchanges as
/// alternating user/assistant turns, then the new question.
pub fn build_messages(
    system_prompt: &str,
    history: &[Exchange],
    question: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(ChatMessage::new(Role::System, system_prompt));
    for exchange in history {
        messages.push(ChatMessage::new(Role::User, exchange.question.as_str()));
        messages.push(ChatMessage::new(Role::Assistant, exchange.answer.as_str()));
    }
    messages.push(ChatMessage::new(Role::User, question));
    messages
}

/// A `CompletionClient` for the OpenAI chat completions API, or anything
/// that speaks the same protocol.
pub struct OpenAICompletionClient {
    client: Client,
    config: CompletionConfig,
}

impl OpenAICompletionClient {
    pub fn new(config: CompletionConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    async fn request_completion(
        &self,
        history: &[Exchange],
        question: &str,
    ) -> Result<String, CompletionError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: build_messages(&self.config.system_prompt, history, question),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        debug!(
            model = %self.config.model,
            messages = body.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(self.config.endpoint())
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: serde_json::Value = response.json().await?;

        if status.is_success() {
            let parsed: ChatResponse = serde_json::from_value(payload)?;
            parsed
                .choices
                .into_iter()
                .next()
                .ok_or(CompletionError::EmptyResponse("no choices in response"))?
                .message
                .content
                .ok_or(CompletionError::EmptyResponse("no content in response"))
        } else {
            let parsed: ErrorResponse = serde_json::from_value(payload)?;
            Err(CompletionError::Api {
                status: status.as_u16(),
                message: parsed.error.message,
            })
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAICompletionClient {
    async fn complete(&self, history: &[Exchange], question: &str) -> String {
        match self.request_completion(history, question).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = ?e, "Chat completion failed");
                e.to_string()
            }
        }
    }
}
