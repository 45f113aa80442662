use axum::{
    body::Bytes,
    extract::{ Request, State },
    http::StatusCode,
    middleware::{ self, Next },
    response::{ sse::{ Event, Sse }, IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use futures::StreamExt;
use serde::{ Deserialize, Serialize };
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{ Any, CorsLayer };
use log::{ debug, error, info, warn };

use crate::analysis::{ AnalysisRequest, AnalysisResult, DocumentAnalyzer };
use crate::llm::{ ChatMessage, GenerateOptions, LlmError, ModelClient, ModelProvider };

pub const API_KEY_HEADER: &str = "x-api-key";

const ASSISTANT_TEMPERATURE: f32 = 0.7;
const ASSISTANT_MAX_TOKENS: u32 = 500;
const STREAM_DONE: &str = "[DONE]";

#[derive(Clone)]
pub struct AppState {
    pub analyzer: DocumentAnalyzer,
    pub assistant: ModelClient,
    pub api_key: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    healthy: bool,
    provider: ModelProvider,
    model: String,
    host: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuickCheckRequest {
    document_text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuickCheckResponse {
    authenticity_score: u8,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ai/health", get(health_handler))
        .route("/api/ai/model", get(model_info_handler))
        .route("/api/ai/analyze", post(analyze_handler))
        .route("/api/ai/quick-check", post(quick_check_handler))
        .route("/api/ai/chat", post(chat_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(cors)
        .with_state(state)
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(expected) = state.api_key.as_deref() {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            warn!("Rejected {} {}: missing or invalid API key", request.method(), request.uri().path());
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse { error: "Unauthorized".into() }),
            ).into_response();
        }
    }
    next.run(request).await
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let client = state.analyzer.client();
    Json(HealthResponse {
        healthy: client.health_check().await,
        provider: client.provider(),
        model: client.model().to_string(),
        host: client.host().to_string(),
    })
}

async fn model_info_handler(State(state): State<AppState>) -> Response {
    match state.analyzer.client().get_model_info().await {
        Some(info) => Json(info).into_response(),
        None =>
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse { error: "Model information unavailable".into() }),
            ).into_response(),
    }
}

async fn analyze_handler(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>
) -> Json<AnalysisResult> {
    info!(
        "Analyzing {} document ({} chars)",
        request.document_type,
        request.document_text.chars().count()
    );
    Json(state.analyzer.analyze_document(&request).await)
}

async fn quick_check_handler(
    State(state): State<AppState>,
    Json(request): Json<QuickCheckRequest>
) -> Json<QuickCheckResponse> {
    let authenticity_score = state.analyzer.quick_authenticity_check(&request.document_text).await;
    Json(QuickCheckResponse { authenticity_score })
}

fn invalid_chat_request() -> Response {
    (StatusCode::BAD_REQUEST, "Invalid request").into_response()
}

/// Body that is not JSON at all is a 500 with `{ error }`; JSON without a
/// usable `messages` array is a 400.
async fn chat_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let mut payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Chat API error: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { error: e.to_string() }),
            ).into_response();
        }
    };

    let history = match payload.get_mut("messages").map(serde_json::Value::take) {
        Some(messages @ serde_json::Value::Array(_)) => messages,
        _ => {
            warn!("Invalid chat request: missing messages array");
            return invalid_chat_request();
        }
    };
    let history: Vec<ChatMessage> = match serde_json::from_value(history) {
        Ok(history) => history,
        Err(e) => {
            warn!("Invalid chat request: {}", e);
            return invalid_chat_request();
        }
    };

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(state.analyzer.prompts().assistant_system_prompt.as_str()));
    messages.extend(history);
    if let Some(last) = messages.last() {
        debug!("Assistant chat with {} messages, last from {}", messages.len(), last.role);
    }

    Sse::new(assistant_events(state.assistant.clone(), messages)).into_response()
}

fn error_event(e: &LlmError) -> Event {
    Event::default().data(serde_json::json!({ "error": e.to_string() }).to_string())
}

/// Relays assistant fragments as SSE events, ending with `[DONE]` or a single
/// error event. Once the client goes away the relay stops waiting on the model
/// and drops the upstream stream.
fn assistant_events(
    client: ModelClient,
    messages: Vec<ChatMessage>
) -> ReceiverStream<Result<Event, Infallible>> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let options = GenerateOptions::new(ASSISTANT_TEMPERATURE, ASSISTANT_MAX_TOKENS);
        let started = tokio::select! {
            _ = tx.closed() => {
                debug!("Chat client disconnected before the stream started");
                return;
            }
            started = client.chat_stream(&messages, options) => started,
        };
        let mut tokens = match started {
            Ok(tokens) => tokens,
            Err(e) => {
                error!("Streaming error: {}", e);
                let _ = tx.send(Ok(error_event(&e))).await;
                return;
            }
        };

        loop {
            let item = tokio::select! {
                _ = tx.closed() => {
                    debug!("Chat client disconnected");
                    return;
                }
                item = tokens.next() => item,
            };
            let event = match item {
                Some(Ok(content)) =>
                    Event::default().data(serde_json::json!({ "content": content }).to_string()),
                Some(Err(e)) => {
                    error!("Streaming error: {}", e);
                    let _ = tx.send(Ok(error_event(&e))).await;
                    return;
                }
                None => {
                    break;
                }
            };
            if tx.send(Ok(event)).await.is_err() {
                debug!("Chat client disconnected");
                return;
            }
        }

        let _ = tx.send(Ok(Event::default().data(STREAM_DONE))).await;
    });

    ReceiverStream::new(rx)
}
