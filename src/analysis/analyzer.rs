use log::{ error, info };
use std::sync::Arc;
use std::time::Instant;

use super::schema::{ parse_findings, parse_leading_integer, Findings };
use super::{ AnalysisError, AnalysisRequest, AnalysisResult };
use crate::config::prompt::{ get_analysis_prompt, get_quick_check_prompt, PromptConfig };
use crate::llm::{ ChatMessage, GenerateOptions, ModelClient };

const ANALYSIS_TEMPERATURE: f32 = 0.3;
const ANALYSIS_MAX_TOKENS: u32 = 2000;
const QUICK_CHECK_TEMPERATURE: f32 = 0.2;
const QUICK_CHECK_MAX_TOKENS: u32 = 10;

/// Score returned by a quick check whose reply could not be used.
pub const NEUTRAL_SCORE: u8 = 50;

#[derive(Clone)]
pub struct DocumentAnalyzer {
    client: ModelClient,
    prompts: Arc<PromptConfig>,
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl DocumentAnalyzer {
    pub fn new(client: ModelClient, prompts: Arc<PromptConfig>) -> Self {
        Self { client, prompts }
    }

    pub fn client(&self) -> &ModelClient {
        &self.client
    }

    pub fn prompts(&self) -> &PromptConfig {
        &self.prompts
    }

    /// Scores a document's authenticity. Never fails: any problem along the
    /// way yields [`AnalysisResult::fail_safe`] carrying the error message.
    pub async fn analyze_document(&self, request: &AnalysisRequest) -> AnalysisResult {
        let started = Instant::now();

        match self.run_analysis(request).await {
            Ok(findings) => {
                let result = findings.into_result(elapsed_ms(started));
                info!(
                    "Analyzed {} document: score={} risk={:?} confidence={} in {}ms",
                    request.document_type,
                    result.authenticity_score,
                    result.risk_level,
                    result.confidence,
                    result.processing_time
                );
                result
            }
            Err(e) => {
                error!("Document analysis error: {}", e);
                AnalysisResult::fail_safe(&e.to_string(), elapsed_ms(started))
            }
        }
    }

    async fn run_analysis(&self, request: &AnalysisRequest) -> Result<Findings, AnalysisError> {
        if !self.client.health_check().await {
            return Err(AnalysisError::Unavailable);
        }

        let messages = vec![
            ChatMessage::system(self.prompts.analysis_system_message.as_str()),
            ChatMessage::user(get_analysis_prompt(&self.prompts, request))
        ];
        let options = GenerateOptions::new(ANALYSIS_TEMPERATURE, ANALYSIS_MAX_TOKENS);
        let response = self.client.chat(&messages, options).await?;

        parse_findings(&response)
    }

    /// Fast, low-rigor score in `0..=100` from the first part of the text.
    /// Returns [`NEUTRAL_SCORE`] when the model is unreachable or its reply
    /// is not a number.
    pub async fn quick_authenticity_check(&self, document_text: &str) -> u8 {
        let prompt = get_quick_check_prompt(document_text);
        let options = GenerateOptions::new(QUICK_CHECK_TEMPERATURE, QUICK_CHECK_MAX_TOKENS);

        match self.client.generate(&prompt, options).await {
            Ok(reply) =>
                match parse_leading_integer(reply.trim()) {
                    Some(score) => score.clamp(0, 100) as u8,
                    None => NEUTRAL_SCORE,
                }
            Err(e) => {
                error!("Quick check error: {}", e);
                NEUTRAL_SCORE
            }
        }
    }
}
