//! Document authenticity analysis on top of the model client.

pub mod analyzer;
pub mod schema;

use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::llm::LlmError;

pub use self::analyzer::DocumentAnalyzer;

pub const FAILED_ANALYSIS_FLAG: &str = "Analysis failed - manual review required";
const FAILED_ANALYSIS_SUMMARY: &str = "Unable to analyze document due to technical error";
const SYSTEM_ERROR_ANOMALY: &str = "system_error";
const FAILED_ANALYSIS_RECOMMENDATIONS: [&str; 2] = [
    "Manual review recommended",
    "Retry analysis after checking Ollama service",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Certificate,
    Id,
    Contract,
    #[default]
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Certificate => "certificate",
            DocumentType::Id => "id",
            DocumentType::Contract => "contract",
            DocumentType::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseDocumentTypeError {
    message: String,
}

impl fmt::Display for ParseDocumentTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseDocumentTypeError {}

impl FromStr for DocumentType {
    type Err = ParseDocumentTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "certificate" => Ok(DocumentType::Certificate),
            "id" => Ok(DocumentType::Id),
            "contract" => Ok(DocumentType::Contract),
            "other" => Ok(DocumentType::Other),
            _ =>
                Err(ParseDocumentTypeError {
                    message: format!("Invalid document type: '{}'", s),
                }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<DateTime<Utc>>,
}

/// Input to a full analysis. Built per call and never stored.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub document_text: String,
    #[serde(default)]
    pub document_type: DocumentType,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl AnalysisRequest {
    pub fn new(document_text: impl Into<String>) -> Self {
        Self {
            document_text: document_text.into(),
            document_type: DocumentType::default(),
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn with_type(mut self, document_type: DocumentType) -> Self {
        self.document_type = document_type;
        self
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub authenticity_score: u8,
    pub risk_level: RiskLevel,
    pub flags: Vec<String>,
    pub content_summary: String,
    pub detected_anomalies: Vec<Anomaly>,
    pub recommendations: Vec<String>,
    pub confidence: u8,
    /// Wall-clock milliseconds spent on the request.
    pub processing_time: u64,
}

impl AnalysisResult {
    /// Result returned when analysis could not be completed. Callers detect it
    /// by the zero score and confidence plus [`FAILED_ANALYSIS_FLAG`].
    pub fn fail_safe(reason: &str, processing_time: u64) -> Self {
        Self {
            authenticity_score: 0,
            risk_level: RiskLevel::High,
            flags: vec![FAILED_ANALYSIS_FLAG.to_string()],
            content_summary: FAILED_ANALYSIS_SUMMARY.to_string(),
            detected_anomalies: vec![Anomaly {
                kind: SYSTEM_ERROR_ANOMALY.to_string(),
                severity: Severity::High,
                description: reason.to_string(),
                location: None,
            }],
            recommendations: FAILED_ANALYSIS_RECOMMENDATIONS.iter()
                .map(|r| r.to_string())
                .collect(),
            confidence: 0,
            processing_time,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.authenticity_score == 0 &&
            self.confidence == 0 &&
            self.flags.iter().any(|f| f == FAILED_ANALYSIS_FLAG)
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Ollama service is not available or model is not loaded")]
    Unavailable,
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("Failed to extract JSON from AI response")]
    MissingJson,
    #[error("Invalid JSON in AI response: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("AI response failed validation: {0}")]
    Schema(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_accepts_camel_case_and_defaults() {
        let req: AnalysisRequest = serde_json::from_value(json!({
            "documentText": "Lease agreement",
            "metadata": { "fileName": "lease.pdf", "uploadDate": "2024-05-01T08:00:00.000Z" }
        })).unwrap();

        assert_eq!(req.document_type, DocumentType::Other);
        assert_eq!(req.metadata.file_name.as_deref(), Some("lease.pdf"));
        assert_eq!(req.metadata.file_type, None);
        assert!(req.metadata.upload_date.is_some());
    }

    #[test]
    fn document_type_parses_case_insensitively() {
        assert_eq!("Certificate".parse::<DocumentType>(), Ok(DocumentType::Certificate));
        assert_eq!("ID".parse::<DocumentType>(), Ok(DocumentType::Id));
        assert!("passport".parse::<DocumentType>().is_err());
    }

    #[test]
    fn fail_safe_result_serializes_with_wire_names() {
        let result = AnalysisResult::fail_safe("boom", 12);
        assert!(result.is_degraded());

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["authenticityScore"], 0);
        assert_eq!(value["riskLevel"], "high");
        assert_eq!(value["flags"], json!(["Analysis failed - manual review required"]));
        assert_eq!(value["detectedAnomalies"][0]["type"], "system_error");
        assert_eq!(value["detectedAnomalies"][0]["severity"], "high");
        assert_eq!(value["detectedAnomalies"][0]["description"], "boom");
        assert!(value["detectedAnomalies"][0].get("location").is_none());
        assert_eq!(
            value["recommendations"],
            json!(["Manual review recommended", "Retry analysis after checking Ollama service"])
        );
        assert_eq!(value["processingTime"], 12);
    }
}
