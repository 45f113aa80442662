use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::info;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE } };
use serde::{ Deserialize, Serialize };

use super::http::{ ensure_success, spawn_line_reader, validate_base_url, LineEvent };
use super::{
    BackendError,
    ChatMessage,
    ModelBackend,
    ModelProvider,
    ModelSummary,
    SamplingOptions,
    TokenStream,
};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Token limit sent when a call does not set one; the API requires a value.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// HTTP adapter for Groq's OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct GroqApi {
    http: HttpClient,
    base_url: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    created: Option<i64>,
}

impl GroqApi {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, BackendError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(BackendError::MissingApiKey(ModelProvider::Groq));
        }
        let base_url = validate_base_url(base_url)?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(
            |_| BackendError::InvalidApiKey
        )?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, auth);

        let http = HttpClient::builder().default_headers(headers).build()?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}/openai/v1{}", self.base_url, route)
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &SamplingOptions
    ) -> Result<String, BackendError> {
        let req = completion_request(model, messages, options, false);
        let resp = self.http.post(self.endpoint("/chat/completions")).json(&req).send().await?;
        let data = ensure_success(resp).await?.json::<CompletionResponse>().await?;
        Ok(
            data.choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default()
        )
    }
}

fn completion_request<'a>(
    model: &'a str,
    messages: &'a [ChatMessage],
    options: &SamplingOptions,
    stream: bool
) -> CompletionRequest<'a> {
    CompletionRequest {
        model,
        messages,
        temperature: options.temperature,
        max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        stream,
    }
}

/// Interprets one server-sent-event line of a streaming completion.
fn parse_event_line(text: &str) -> LineEvent {
    let Some(data) = text.strip_prefix("data:") else {
        return LineEvent::Ignore;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return LineEvent::End(None);
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return LineEvent::Fail(BackendError::Server(error.message));
            }
            let Some(choice) = chunk.choices.into_iter().next() else {
                return LineEvent::Ignore;
            };
            let content = choice.delta.content.filter(|c| !c.is_empty());
            match (content, choice.finish_reason) {
                (content, Some(_)) => LineEvent::End(content),
                (Some(content), None) => LineEvent::Token(content),
                (None, None) => LineEvent::Ignore,
            }
        }
        Err(e) => {
            info!("Failed to parse Groq chunk: {}, error: {}", data, e);
            LineEvent::Ignore
        }
    }
}

#[async_trait]
impl ModelBackend for GroqApi {
    async fn list_models(&self) -> Result<Vec<ModelSummary>, BackendError> {
        let resp = self.http.get(self.endpoint("/models")).send().await?;
        let list = ensure_success(resp).await?.json::<ModelList>().await?;
        Ok(
            list.data
                .into_iter()
                .map(|m| ModelSummary {
                    name: m.id,
                    size: None,
                    modified_at: m.created
                        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                        .map(|d| d.to_rfc3339()),
                })
                .collect()
        )
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &SamplingOptions
    ) -> Result<String, BackendError> {
        self.complete(model, &[ChatMessage::user(prompt)], options).await
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &SamplingOptions
    ) -> Result<String, BackendError> {
        self.complete(model, messages, options).await
    }

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &SamplingOptions
    ) -> Result<TokenStream<BackendError>, BackendError> {
        let req = completion_request(model, messages, options, true);
        let url = self.endpoint("/chat/completions");
        info!("Starting Groq stream request to {}", url);
        let resp = self.http.post(&url).json(&req).send().await?;
        let resp = ensure_success(resp).await?;
        Ok(spawn_line_reader(resp, parse_event_line))
    }

    async fn show(&self, model: &str) -> Result<serde_json::Value, BackendError> {
        let resp = self.http.get(self.endpoint(&format!("/models/{}", model))).send().await?;
        let info = ensure_success(resp).await?.json::<serde_json::Value>().await?;
        Ok(info)
    }

    fn host(&self) -> &str {
        &self.base_url
    }

    fn provider(&self) -> ModelProvider {
        ModelProvider::Groq
    }
}
