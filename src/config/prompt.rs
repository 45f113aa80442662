use chrono::SecondsFormat;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use log::info;

use crate::analysis::{ AnalysisRequest, DocumentType };

/// Characters of document text sent with a quick check.
pub const QUICK_CHECK_CHAR_LIMIT: usize = 1000;

const UNKNOWN: &str = "Unknown";

const ANALYSIS_SYSTEM_MESSAGE: &str =
    "You are a professional document authenticity analyzer. Respond only with valid JSON.";

const CERTIFICATE_TEMPLATE: &str =
    "You are an expert document analyst specializing in educational and professional certificates.
Analyze the document for authenticity by checking:
- Signature placement and quality
- Seal/stamp authenticity
- Date consistency and format
- Institutional formatting standards
- Language and grammar quality
- Security features presence";

const ID_TEMPLATE: &str =
    "You are an expert document analyst specializing in identity documents.
Analyze the document for authenticity by checking:
- Photo quality and consistency
- Data field consistency (dates, numbers)
- Security features (holograms, watermarks)
- Font and formatting standards
- Document structure compliance";

const CONTRACT_TEMPLATE: &str =
    "You are an expert legal document analyst.
Analyze the contract for authenticity and completeness by checking:
- Legal language patterns
- Clause completeness and structure
- Signature blocks
- Date consistency
- Standard contract formatting
- Missing or unusual clauses";

const OTHER_TEMPLATE: &str =
    "You are an expert document analyst.
Analyze this document for authenticity and integrity by checking:
- Overall formatting consistency
- Content coherence
- Unusual patterns or anomalies
- Signs of tampering or manipulation
- Professional quality standards";

const OUTPUT_CONTRACT: &str =
    r#"Please analyze this document and provide a detailed assessment in JSON format with the following structure:
{
  "authenticityScore": <number 0-100>,
  "riskLevel": "<low|medium|high>",
  "flags": ["<flag1>", "<flag2>"],
  "contentSummary": "<brief summary>",
  "detectedAnomalies": [
    {
      "type": "<anomaly type>",
      "severity": "<low|medium|high>",
      "description": "<detailed description>",
      "location": "<where in document>"
    }
  ],
  "recommendations": ["<recommendation1>", "<recommendation2>"],
  "confidence": <number 0-100>
}

Respond ONLY with valid JSON, no additional text."#;

const ASSISTANT_SYSTEM_PROMPT: &str =
    "You are DocShield Assistant, a helpful AI chatbot for the DocShield quantum-safe document verification platform.

Your role:
- Help users understand document verification processes
- Explain cybersecurity and quantum cryptography concepts
- Guide users through the platform features
- Answer questions about document security
- Be friendly, concise, and professional

Platform features:
- Quantum-resistant digital signatures (RSA-2048, migrating to Dilithium3)
- AI-powered document authenticity analysis with Llama 3.3
- Support for certificates, IDs, contracts, and other documents
- Real-time verification with blockchain-style certificate chains
- Educational modules on cybersecurity

Keep responses helpful and under 200 words unless asked for detailed explanations.";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt file IO error for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Prompt JSON parsing error for '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Prompt texts used by the analyzer and the assistant chat.
///
/// Every field can be overridden from a JSON file; anything the file leaves
/// out keeps the built-in text.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PromptConfig {
    pub analysis_system_message: String,
    pub document_templates: HashMap<String, String>,
    pub assistant_system_prompt: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            analysis_system_message: ANALYSIS_SYSTEM_MESSAGE.to_string(),
            document_templates: HashMap::new(),
            assistant_system_prompt: ASSISTANT_SYSTEM_PROMPT.to_string(),
        }
    }
}

fn builtin_template(document_type: DocumentType) -> &'static str {
    match document_type {
        DocumentType::Certificate => CERTIFICATE_TEMPLATE,
        DocumentType::Id => ID_TEMPLATE,
        DocumentType::Contract => CONTRACT_TEMPLATE,
        DocumentType::Other => OTHER_TEMPLATE,
    }
}

impl PromptConfig {
    pub fn template_for(&self, document_type: DocumentType) -> &str {
        self.document_templates
            .get(document_type.as_str())
            .map(|s| s.as_str())
            .unwrap_or_else(|| builtin_template(document_type))
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let display = path.as_ref().display().to_string();
    let file_content = fs::read_to_string(&path).map_err(|source| PromptError::Io {
        path: display.clone(),
        source,
    })?;
    let config: PromptConfig = serde_json::from_str(&file_content).map_err(|source| PromptError::Json {
        path: display.clone(),
        source,
    })?;
    info!(
        "Loaded prompt overrides from '{}' ({} document templates)",
        display,
        config.document_templates.len()
    );
    Ok(Arc::new(config))
}

/// Builds the single user turn for a full analysis.
pub fn get_analysis_prompt(config: &PromptConfig, request: &AnalysisRequest) -> String {
    let metadata = &request.metadata;
    let file_name = metadata.file_name.as_deref().unwrap_or(UNKNOWN);
    let file_type = metadata.file_type.as_deref().unwrap_or(UNKNOWN);
    let upload_date = metadata.upload_date
        .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| UNKNOWN.to_string());

    format!(
        "{template}

Document Text:
\"\"\"
{text}
\"\"\"

Document Metadata:
- File Name: {file_name}
- File Type: {file_type}
- Upload Date: {upload_date}

{contract}",
        template = config.template_for(request.document_type),
        text = request.document_text,
        contract = OUTPUT_CONTRACT
    )
}

pub fn get_quick_check_prompt(document_text: &str) -> String {
    let excerpt: String = document_text.chars().take(QUICK_CHECK_CHAR_LIMIT).collect();
    format!(
        "Rate the authenticity of this document from 0-100 based on formatting, language quality, and professional appearance. Respond with ONLY a number, no explanation.

Document:
\"\"\"
{excerpt}
\"\"\"

Authenticity Score (0-100):"
    )
}
