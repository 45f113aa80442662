pub mod analysis;
pub mod cli;
pub mod config;
pub mod llm;
pub mod server;

use analysis::DocumentAnalyzer;
use cli::{ commands, Args, Command };
use config::prompt::{ load_prompts, PromptConfig };
use config::ModelConfig;
use llm::{ ModelClient, ModelProvider };
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

fn build_client(args: &Args, provider: ModelProvider) -> Result<ModelClient, Box<dyn Error + Send + Sync>> {
    let config = ModelConfig::from_args(args, provider);
    info!("{} Base URL: {}", provider, config.base_url);
    info!("{} Model: {}", provider, config.model);
    info!("{} Default Temperature: {}", provider, config.temperature);
    ModelClient::for_provider(provider, &config, args.groq_api_key.as_deref()).map_err(|e| {
        format!("Failed to configure {} client: {}", provider, e).into()
    })
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Analysis Provider: {}", args.analysis_provider);
    info!("Chat Provider: {}", args.chat_provider);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    let client = build_client(&args, args.analysis_provider)?;
    let assistant = if args.chat_provider == args.analysis_provider {
        client.clone()
    } else {
        build_client(&args, args.chat_provider)?
    };
    info!("-------------------------");

    let prompts = match &args.prompts_path {
        Some(path) => load_prompts(path)?,
        None => Arc::new(PromptConfig::default()),
    };
    let analyzer = DocumentAnalyzer::new(client, prompts);

    match args.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => {
            info!("Starting server on: {}", args.server_addr);
            Server::new(&args, analyzer, assistant)?.run().await?;
        }
        Command::Check => commands::check(analyzer.client()).await?,
        Command::Analyze { path, document_type } => {
            commands::analyze(&analyzer, &path, document_type).await?
        }
        Command::QuickCheck { path } => commands::quick_check(&analyzer, &path).await?,
    }

    Ok(())
}
