use futures::StreamExt;
use log::debug;
use reqwest::Response;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use url::Url;

use super::{ BackendError, TokenStream };

/// What one line of a streamed response means to the reader.
pub(crate) enum LineEvent {
    Token(String),
    Ignore,
    /// Last line of the stream, optionally carrying a final fragment.
    End(Option<String>),
    Fail(BackendError),
}

/// Checks that `base_url` is an absolute http(s) URL and strips the trailing `/`.
pub(crate) fn validate_base_url(base_url: &str) -> Result<String, BackendError> {
    let parsed = Url::parse(base_url).map_err(|e| BackendError::InvalidUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(base_url.trim_end_matches('/').to_string()),
        scheme =>
            Err(BackendError::InvalidUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme '{}', expected http or https", scheme),
            }),
    }
}

/// Pulls the message out of `{"error": "..."}` or `{"error": {"message": "..."}}`.
fn error_message(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    match value.get("error")? {
        Value::String(message) => Some(message.clone()),
        other => other.get("message").and_then(Value::as_str).map(str::to_string),
    }
}

pub(crate) async fn ensure_success(resp: Response) -> Result<Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let body = error_message(&text).unwrap_or(text);
    Err(BackendError::Status { status: status.as_u16(), body })
}

/// Forwards one line. Returns `false` once the reader should stop.
async fn forward_line(
    line: &[u8],
    parse: fn(&str) -> LineEvent,
    tx: &mpsc::Sender<Result<String, BackendError>>
) -> bool {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(e) => {
            debug!("Skipping non UTF-8 stream line: {}", e);
            return true;
        }
    };
    if text.is_empty() {
        return true;
    }

    match parse(text) {
        LineEvent::Token(token) => tx.send(Ok(token)).await.is_ok(),
        LineEvent::Ignore => true,
        LineEvent::End(last) => {
            if let Some(token) = last {
                let _ = tx.send(Ok(token)).await;
            }
            false
        }
        LineEvent::Fail(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

/// Reads a line-delimited streaming body on a background task.
///
/// The task owns the response. It exits, closing the connection, as soon as
/// the returned stream is dropped, even while the server is silent.
pub(crate) fn spawn_line_reader(response: Response, parse: fn(&str) -> LineEvent) -> TokenStream<BackendError> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut bytes = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();

        loop {
            let next = tokio::select! {
                _ = tx.closed() => {
                    debug!("Token stream dropped, closing model server response");
                    return;
                }
                next = bytes.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    pending.extend_from_slice(&chunk);
                    // Network chunks do not respect line boundaries.
                    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = pending.drain(..=pos).collect();
                        if !forward_line(&line, parse, &tx).await {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    let _ = tx.send(Err(BackendError::Http(e))).await;
                    return;
                }
                None => {
                    break;
                }
            }
        }

        if !pending.is_empty() {
            forward_line(&pending, parse, &tx).await;
        }
    });

    Box::pin(ReceiverStream::new(rx))
}
