use chrono::Utc;
use log::{ error, info };
use std::error::Error;
use std::path::Path;

use crate::analysis::{ AnalysisRequest, DocumentAnalyzer, DocumentMetadata, DocumentType };
use crate::llm::{ GenerateOptions, ModelClient, ModelProvider };

/// Connectivity self-test: health, model metadata, then a tiny generation.
pub async fn check(client: &ModelClient) -> Result<(), Box<dyn Error + Send + Sync>> {
    let provider = client.provider();
    info!("Checking {} service at {}...", provider, client.host());
    if !client.health_check().await {
        error!("{} service is not available", provider);
        eprintln!("Make sure:");
        match provider {
            ModelProvider::Ollama => {
                eprintln!("   1. Ollama is installed: https://ollama.com/download");
                eprintln!("   2. The model is pulled: ollama pull {}", client.model());
                eprintln!("   3. Ollama service is running: ollama serve");
            }
            ModelProvider::Groq => {
                eprintln!("   1. GROQ_API_KEY is valid: https://console.groq.com");
                eprintln!("   2. GROQ_MODEL names an available model: {}", client.model());
            }
        }
        return Err(format!("model {} is not available at {}", client.model(), client.host()).into());
    }
    info!("{} service is running", provider);

    if let Some(model_info) = client.get_model_info().await {
        let modelfile = model_info
            .get("modelfile")
            .and_then(|m| m.as_str())
            .unwrap_or(client.model());
        info!("Model: {}", modelfile);
    }

    let response = client.generate("Say hello in one word", GenerateOptions::new(0.1, 10)).await?;
    println!("Response: \"{}\"", response.trim());
    println!("All {} checks passed", provider);
    Ok(())
}

async fn read_request(
    path: &Path,
    document_type: DocumentType
) -> Result<AnalysisRequest, Box<dyn Error + Send + Sync>> {
    let text = tokio::fs
        ::read_to_string(path).await
        .map_err(|e| format!("Failed to read document '{}': {}", path.display(), e))?;

    let metadata = DocumentMetadata {
        file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        file_type: path.extension().map(|e| e.to_string_lossy().into_owned()),
        upload_date: Some(Utc::now()),
    };
    Ok(AnalysisRequest::new(text).with_type(document_type).with_metadata(metadata))
}

pub async fn analyze(
    analyzer: &DocumentAnalyzer,
    path: &Path,
    document_type: DocumentType
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let request = read_request(path, document_type).await?;
    let result = analyzer.analyze_document(&request).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub async fn quick_check(
    analyzer: &DocumentAnalyzer,
    path: &Path
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let request = read_request(path, DocumentType::Other).await?;
    let score = analyzer.quick_authenticity_check(&request.document_text).await;
    println!("{}", score);
    Ok(())
}
