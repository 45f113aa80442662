use futures::StreamExt;
use log::{ error, warn };
use std::sync::Arc;

use super::{
    BackendError,
    ChatMessage,
    GenerateOptions,
    GroqApi,
    LlmError,
    ModelBackend,
    ModelProvider,
    OllamaApi,
    SamplingOptions,
    TokenStream,
};
use crate::config::ModelConfig;

/// Thin client over a [`ModelBackend`] bound to one model and default
/// temperature. Holds no mutable state and never retries.
#[derive(Clone)]
pub struct ModelClient {
    backend: Arc<dyn ModelBackend>,
    model: String,
    default_temperature: f32,
}

impl ModelClient {
    /// Builds a client that talks to Ollama at `config.base_url`.
    pub fn new(config: &ModelConfig) -> Result<Self, BackendError> {
        let api = OllamaApi::new(&config.base_url)?;
        Ok(Self::with_backend(Arc::new(api), config))
    }

    /// Builds a client for `provider`. Groq needs `api_key`; Ollama ignores it.
    pub fn for_provider(
        provider: ModelProvider,
        config: &ModelConfig,
        api_key: Option<&str>
    ) -> Result<Self, BackendError> {
        let backend: Arc<dyn ModelBackend> = match provider {
            ModelProvider::Ollama => Arc::new(OllamaApi::new(&config.base_url)?),
            ModelProvider::Groq =>
                Arc::new(GroqApi::new(&config.base_url, api_key.unwrap_or_default())?),
        };
        Ok(Self::with_backend(backend, config))
    }

    pub fn with_backend(backend: Arc<dyn ModelBackend>, config: &ModelConfig) -> Self {
        Self {
            backend,
            model: config.model.clone(),
            default_temperature: config.temperature,
        }
    }

    pub fn host(&self) -> &str {
        self.backend.host()
    }

    pub fn provider(&self) -> ModelProvider {
        self.backend.provider()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn default_temperature(&self) -> f32 {
        self.default_temperature
    }

    fn sampling(&self, options: GenerateOptions) -> SamplingOptions {
        SamplingOptions {
            temperature: options.temperature.unwrap_or(self.default_temperature),
            max_tokens: options.max_tokens,
        }
    }

    /// True only when the server is reachable and lists the configured model.
    pub async fn health_check(&self) -> bool {
        match self.backend.list_models().await {
            Ok(models) => {
                if models.iter().any(|m| m.name == self.model) {
                    return true;
                }
                let available: Vec<&str> = models
                    .iter()
                    .map(|m| m.name.as_str())
                    .collect();
                warn!("Model {} not found. Available models: {:?}", self.model, available);
                false
            }
            Err(e) => {
                error!("{} health check failed: {}", self.provider(), e);
                false
            }
        }
    }

    pub async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<String, LlmError> {
        self.backend
            .generate(&self.model, prompt, &self.sampling(options)).await
            .map_err(|e| {
                error!("{} generate error: {}", self.provider(), e);
                LlmError::Generate(e)
            })
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: GenerateOptions
    ) -> Result<String, LlmError> {
        self.backend
            .chat(&self.model, messages, &self.sampling(options)).await
            .map_err(|e| {
                error!("{} chat error: {}", self.provider(), e);
                LlmError::Chat(e)
            })
    }

    /// Streams assistant fragments as they arrive. The stream is single-pass;
    /// issue a new call to retry.
    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: GenerateOptions
    ) -> Result<TokenStream<LlmError>, LlmError> {
        let stream = self.backend
            .chat_stream(&self.model, messages, &self.sampling(options)).await
            .map_err(|e| {
                error!("{} stream error: {}", self.provider(), e);
                LlmError::Stream(e)
            })?;

        let provider = self.provider();
        Ok(
            Box::pin(
                stream.map(move |item| {
                    item.map_err(|e| {
                        error!("{} stream error: {}", provider, e);
                        LlmError::Stream(e)
                    })
                })
            )
        )
    }

    /// Best-effort model metadata for diagnostics.
    pub async fn get_model_info(&self) -> Option<serde_json::Value> {
        match self.backend.show(&self.model).await {
            Ok(info) => Some(info),
            Err(e) => {
                error!("Failed to get model info: {}", e);
                None
            }
        }
    }
}
