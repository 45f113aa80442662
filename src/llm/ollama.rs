use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use async_trait::async_trait;
use log::info;

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

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// HTTP adapter for the Ollama REST API.
#[derive(Debug, Clone)]
pub struct OllamaApi {
    http: HttpClient,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a SamplingOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: &'a SamplingOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelSummary>,
}

#[derive(Serialize)]
struct ShowRequest<'a> {
    model: &'a str,
}

impl OllamaApi {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        Ok(Self {
            http: HttpClient::new(),
            base_url: validate_base_url(base_url)?,
        })
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }
}

/// Interprets one NDJSON line of a streaming `/api/chat` response.
fn parse_chat_line(text: &str) -> LineEvent {
    match serde_json::from_str::<StreamChunk>(text) {
        Ok(chunk) => {
            if let Some(message) = chunk.error {
                return LineEvent::Fail(BackendError::Server(message));
            }
            let content = chunk.message
                .map(|m| m.content)
                .filter(|c| !c.is_empty());
            match (content, chunk.done) {
                (content, true) => LineEvent::End(content),
                (Some(content), false) => LineEvent::Token(content),
                (None, false) => LineEvent::Ignore,
            }
        }
        Err(e) => {
            info!("JSON parse error: {} for line: {}", e, text);
            LineEvent::Ignore
        }
    }
}

#[async_trait]
impl ModelBackend for OllamaApi {
    async fn list_models(&self) -> Result<Vec<ModelSummary>, BackendError> {
        let resp = self.http.get(self.endpoint("/api/tags")).send().await?;
        let tags = ensure_success(resp).await?.json::<TagsResponse>().await?;
        Ok(tags.models)
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &SamplingOptions
    ) -> Result<String, BackendError> {
        let req = GenerateRequest { model, prompt, stream: false, options };
        let resp = self.http.post(self.endpoint("/api/generate")).json(&req).send().await?;
        let data = ensure_success(resp).await?.json::<GenerateResponse>().await?;
        Ok(data.response)
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &SamplingOptions
    ) -> Result<String, BackendError> {
        let req = ChatRequest { model, messages, stream: false, options };
        let resp = self.http.post(self.endpoint("/api/chat")).json(&req).send().await?;
        let data = ensure_success(resp).await?.json::<ChatResponse>().await?;
        Ok(data.message.content)
    }

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &SamplingOptions
    ) -> Result<TokenStream<BackendError>, BackendError> {
        let req = ChatRequest { model, messages, stream: true, options };
        let url = self.endpoint("/api/chat");
        info!("Starting Ollama chat stream to {}", url);
        let resp = self.http.post(&url).json(&req).send().await?;
        let resp = ensure_success(resp).await?;
        Ok(spawn_line_reader(resp, parse_chat_line))
    }

    async fn show(&self, model: &str) -> Result<serde_json::Value, BackendError> {
        let resp = self.http
            .post(self.endpoint("/api/show"))
            .json(&ShowRequest { model })
            .send().await?;
        let info = ensure_success(resp).await?.json::<serde_json::Value>().await?;
        Ok(info)
    }

    fn host(&self) -> &str {
        &self.base_url
    }

    fn provider(&self) -> ModelProvider {
        ModelProvider::Ollama
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::State,
        http::StatusCode,
        response::{ IntoResponse, Response as AxumResponse },
        routing::{ get, post },
        Json,
        Router,
    };
    use futures::StreamExt;
    use serde_json::{ json, Value };
    use std::sync::atomic::{ AtomicBool, Ordering };
    use std::sync::{ Arc, Mutex };
    use std::time::Duration;

    type Captured = Arc<Mutex<Vec<Value>>>;

    const STREAM_CHUNKS: [&str; 3] = [
        "{\"message\":{\"role\":\"assistant\",\"content\":\"Doc\"},\"done\":false}\n{\"message\":{\"role\":\"assi",
        "stant\",\"content\":\"Shield\"},\"done\":false}\n",
        "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
    ];

    async fn chat_handler(State(captured): State<Captured>, Json(body): Json<Value>) -> AxumResponse {
        captured.lock().unwrap().push(body.clone());

        if body["model"] != "llama3.3:70b" {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("model '{}' not found", body["model"].as_str().unwrap_or("")) })),
            ).into_response();
        }

        if body["stream"] == true {
            let chunks = STREAM_CHUNKS.iter()
                .map(|c| Ok::<_, std::io::Error>(c.to_string()))
                .collect::<Vec<_>>();
            return Body::from_stream(futures::stream::iter(chunks)).into_response();
        }

        Json(json!({
            "model": "llama3.3:70b",
            "message": { "role": "assistant", "content": "{\"authenticityScore\": 90}" },
            "done": true
        })).into_response()
    }

    fn fake_ollama(captured: Captured) -> Router {
        Router::new()
            .route(
                "/api/tags",
                get(|| async {
                    Json(json!({
                        "models": [
                            { "name": "llama3.3:70b", "size": 42, "modified_at": "2024-12-01T10:00:00Z" },
                            { "name": "phi3:mini" }
                        ]
                    }))
                })
            )
            .route(
                "/api/generate",
                post(|State(captured): State<Captured>, Json(body): Json<Value>| async move {
                    captured.lock().unwrap().push(body);
                    Json(json!({ "model": "llama3.3:70b", "response": "Hello", "done": true }))
                })
            )
            .route("/api/chat", post(chat_handler))
            .route(
                "/api/show",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({ "modelfile": format!("FROM {}", body["model"].as_str().unwrap_or("")) }))
                })
            )
            .with_state(captured)
    }

    async fn spawn_fake_ollama() -> (OllamaApi, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = fake_ollama(captured.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let api = OllamaApi::new(&format!("http://{}/", addr)).unwrap();
        (api, captured)
    }

    fn options() -> SamplingOptions {
        SamplingOptions { temperature: 0.3, max_tokens: Some(2000) }
    }

    #[test]
    fn rejects_malformed_base_url() {
        let err = OllamaApi::new("not a url").unwrap_err();
        assert!(matches!(err, BackendError::InvalidUrl { .. }));
    }

    #[test]
    fn rejects_base_url_without_http_scheme() {
        let err = OllamaApi::new("localhost:11434").unwrap_err();
        assert!(matches!(err, BackendError::InvalidUrl { .. }));
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn trims_trailing_slash_from_host() {
        let api = OllamaApi::new("http://localhost:11434/").unwrap();
        assert_eq!(api.host(), "http://localhost:11434");
        assert_eq!(api.endpoint("/api/tags"), "http://localhost:11434/api/tags");
    }

    #[tokio::test]
    async fn lists_models() {
        let (api, _) = spawn_fake_ollama().await;
        let models = api.list_models().await.unwrap();
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["llama3.3:70b", "phi3:mini"]);
        assert_eq!(models[0].size, Some(42));
        assert_eq!(models[1].modified_at, None);
    }

    #[tokio::test]
    async fn generate_sends_sampling_options() {
        let (api, captured) = spawn_fake_ollama().await;
        let text = api.generate("llama3.3:70b", "Say hello", &options()).await.unwrap();
        assert_eq!(text, "Hello");

        let bodies = captured.lock().unwrap();
        let body = &bodies[0];
        assert_eq!(body["prompt"], "Say hello");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 2000);
        assert!((body["options"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn generate_omits_unset_token_limit() {
        let (api, captured) = spawn_fake_ollama().await;
        let opts = SamplingOptions { temperature: 0.7, max_tokens: None };
        api.generate("llama3.3:70b", "Say hello", &opts).await.unwrap();

        let bodies = captured.lock().unwrap();
        assert!(bodies[0]["options"].get("num_predict").is_none());
    }

    #[tokio::test]
    async fn chat_returns_assistant_content() {
        let (api, captured) = spawn_fake_ollama().await;
        let messages = vec![ChatMessage::system("Be terse."), ChatMessage::user("Analyze")];
        let reply = api.chat("llama3.3:70b", &messages, &options()).await.unwrap();
        assert_eq!(reply, "{\"authenticityScore\": 90}");

        let bodies = captured.lock().unwrap();
        assert_eq!(bodies[0]["messages"][0]["role"], "system");
        assert_eq!(bodies[0]["messages"][1]["content"], "Analyze");
    }

    #[tokio::test]
    async fn chat_surfaces_server_error_body() {
        let (api, _) = spawn_fake_ollama().await;
        let err = api.chat("missing:1b", &[ChatMessage::user("hi")], &options()).await.unwrap_err();
        match err {
            BackendError::Status { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "model 'missing:1b' not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn chat_stream_reassembles_split_lines() {
        let (api, captured) = spawn_fake_ollama().await;
        let stream = api
            .chat_stream("llama3.3:70b", &[ChatMessage::user("hi")], &options()).await
            .unwrap();
        let fragments: Vec<String> = stream
            .map(|item| item.unwrap())
            .collect().await;
        assert_eq!(fragments, vec!["Doc".to_string(), "Shield".to_string()]);
        assert_eq!(captured.lock().unwrap()[0]["stream"], true);
    }

    #[tokio::test]
    async fn chat_stream_fails_before_streaming_on_bad_model() {
        let (api, _) = spawn_fake_ollama().await;
        let result = api.chat_stream("missing:1b", &[ChatMessage::user("hi")], &options()).await;
        assert!(matches!(result, Err(BackendError::Status { status: 404, .. })));
    }

    #[test]
    fn stream_error_line_ends_the_stream() {
        match parse_chat_line("{\"error\":\"out of memory\"}") {
            LineEvent::Fail(BackendError::Server(msg)) => assert_eq!(msg, "out of memory"),
            _ => panic!("error line should fail the stream"),
        }
    }

    #[test]
    fn done_line_keeps_its_final_fragment() {
        let line = r#"{"message":{"role":"assistant","content":"!"},"done":true}"#;
        assert!(matches!(parse_chat_line(line), LineEvent::End(Some(ref c)) if c == "!"));
        assert!(matches!(parse_chat_line("not json"), LineEvent::Ignore));
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn dropping_the_stream_closes_a_stalled_connection() {
        let closed = Arc::new(AtomicBool::new(false));
        let flag = closed.clone();
        let app = Router::new().route(
            "/api/chat",
            post(move || {
                let guard = SetOnDrop(flag.clone());
                async move {
                    let first = futures::stream::iter(vec![
                        Ok::<_, std::io::Error>(
                            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hi\"},\"done\":false}\n".to_string()
                        ),
                    ]);
                    // Never finishes; the guard drops only when the server gives up on the body.
                    let stalled = futures::stream::pending::<Result<String, std::io::Error>>().map(move |item| {
                        let _ = &guard;
                        item
                    });
                    Body::from_stream(first.chain(stalled))
                }
            })
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let api = OllamaApi::new(&format!("http://{}", addr)).unwrap();
        let mut stream = api
            .chat_stream("llama3.3:70b", &[ChatMessage::user("hi")], &options()).await
            .unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "Hi");
        assert!(!closed.load(Ordering::SeqCst));

        drop(stream);
        for _ in 0..40 {
            if closed.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(closed.load(Ordering::SeqCst), "connection stayed open after the stream was dropped");
    }

    #[tokio::test]
    async fn show_returns_raw_metadata() {
        let (api, _) = spawn_fake_ollama().await;
        let info = api.show("llama3.3:70b").await.unwrap();
        assert_eq!(info["modelfile"], "FROM llama3.3:70b");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let api = OllamaApi::new("http://127.0.0.1:1").unwrap();
        let err = api.list_models().await.unwrap_err();
        assert!(matches!(err, BackendError::Http(_)));
    }
}
