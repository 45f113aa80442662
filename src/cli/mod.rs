pub mod commands;

use clap::{ Parser, Subcommand };
use std::path::PathBuf;

use crate::analysis::DocumentType;
use crate::llm::ModelProvider;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Model Server Args ---
    /// Base URL of the Ollama server
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    pub ollama_base_url: String,

    /// Model used for analysis and chat (must be pulled on the server)
    #[arg(long, env = "OLLAMA_MODEL", default_value = "llama3.3:70b")]
    pub ollama_model: String,

    /// Default sampling temperature when a call does not set one
    #[arg(long, env = "OLLAMA_TEMPERATURE", default_value = "0.7")]
    pub ollama_temperature: f32,

    // --- Groq Args ---
    /// Groq API key, required when either provider is `groq`
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,

    #[arg(long, env = "GROQ_BASE_URL", default_value = "https://api.groq.com")]
    pub groq_base_url: String,

    #[arg(long, env = "GROQ_MODEL", default_value = "llama-3.3-70b-versatile")]
    pub groq_model: String,

    #[arg(long, env = "GROQ_TEMPERATURE", default_value = "0.7")]
    pub groq_temperature: f32,

    // --- Provider Args ---
    /// Provider behind document analysis and the CLI commands (ollama or groq)
    #[arg(long, env = "ANALYSIS_PROVIDER", default_value = "ollama")]
    pub analysis_provider: ModelProvider,

    /// Provider behind the streaming assistant chat (ollama or groq)
    #[arg(long, env = "CHAT_PROVIDER", default_value = "ollama")]
    pub chat_provider: ModelProvider,

    /// Optional JSON file overriding the built-in prompt templates.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    // --- Server Args ---
    /// Host address and port for the HTTP API to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional API key. If set, clients must send it in the `x-api-key` header.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    /// Path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the analysis HTTP API (default)
    Serve,
    /// Verify the analysis model server is reachable and the model can generate
    Check,
    /// Run a full authenticity analysis on a text file and print the JSON result
    Analyze {
        /// File containing the extracted document text
        path: PathBuf,

        /// certificate, id, contract or other
        #[arg(short = 't', long, default_value = "other")]
        document_type: DocumentType,
    },
    /// Print the quick 0-100 authenticity score for a text file
    QuickCheck {
        path: PathBuf,
    },
}
