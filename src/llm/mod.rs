pub mod client;
pub mod groq;
mod http;
pub mod ollama;

use async_trait::async_trait;
use futures::Stream;
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use thiserror::Error;

pub use self::client::ModelClient;
pub use self::groq::GroqApi;
pub use self::ollama::OllamaApi;

/// Stream of text fragments produced by a streaming chat call.
pub type TokenStream<E> = Pin<Box<dyn Stream<Item = Result<String, E>> + Send>>;

/// Model server flavour a [`ModelClient`] talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    Ollama,
    Groq,
}

impl ModelProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelProvider::Ollama => "ollama",
            ModelProvider::Groq => "groq",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseModelProviderError {
    message: String,
}

impl fmt::Display for ParseModelProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseModelProviderError {}

impl FromStr for ModelProvider {
    type Err = ParseModelProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(ModelProvider::Ollama),
            "groq" => Ok(ModelProvider::Groq),
            _ =>
                Err(ParseModelProviderError {
                    message: format!("Invalid model provider: '{}'", s),
                }),
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelProvider::Ollama => write!(f, "Ollama"),
            ModelProvider::Groq => write!(f, "Groq"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Per-call overrides accepted by [`ModelClient`]. Unset fields fall back to
/// the client defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerateOptions {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self { temperature: Some(temperature), max_tokens: Some(max_tokens) }
    }
}

/// Fully resolved sampling options as sent to the model server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingOptions {
    pub temperature: f32,
    #[serde(rename = "num_predict", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid model server URL '{url}': {reason}")]
    InvalidUrl {
        url: String,
        reason: String,
    },
    #[error("an API key is required for {0}")]
    MissingApiKey(ModelProvider),
    #[error("API key is not a valid header value")]
    InvalidApiKey,
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("model server returned status {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("unexpected response from model server: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    Server(String),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Failed to generate response: {0}")]
    Generate(#[source] BackendError),
    #[error("Failed to chat: {0}")]
    Chat(#[source] BackendError),
    #[error("Failed to stream chat: {0}")]
    Stream(#[source] BackendError),
}

/// Capabilities the model client needs from a model server.
///
/// [`OllamaApi`] speaks the Ollama HTTP protocol and [`GroqApi`] the
/// OpenAI-compatible Groq API; tests plug in stubs.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelSummary>, BackendError>;

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &SamplingOptions
    ) -> Result<String, BackendError>;

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &SamplingOptions
    ) -> Result<String, BackendError>;

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &SamplingOptions
    ) -> Result<TokenStream<BackendError>, BackendError>;

    async fn show(&self, model: &str) -> Result<serde_json::Value, BackendError>;

    fn host(&self) -> &str;

    fn provider(&self) -> ModelProvider;
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}
