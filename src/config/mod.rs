pub mod prompt;

use crate::cli::Args;
use crate::llm::ollama::DEFAULT_BASE_URL;
use crate::llm::ModelProvider;

pub const DEFAULT_MODEL: &str = "llama3.3:70b";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Model client settings. Fixed for the lifetime of a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl ModelConfig {
    /// Settings for `provider` taken from its own group of arguments.
    pub fn from_args(args: &Args, provider: ModelProvider) -> Self {
        match provider {
            ModelProvider::Ollama =>
                Self {
                    base_url: args.ollama_base_url.clone(),
                    model: args.ollama_model.clone(),
                    temperature: args.ollama_temperature,
                },
            ModelProvider::Groq =>
                Self {
                    base_url: args.groq_base_url.clone(),
                    model: args.groq_model.clone(),
                    temperature: args.groq_temperature,
                },
        }
    }
}
