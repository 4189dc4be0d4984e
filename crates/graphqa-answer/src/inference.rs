//! Language-model inference over an Ollama-compatible `/api/chat` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use graphqa_core::config::LlmSettings;
use graphqa_core::{Answer, Prompt};

/// Longest slice of an error body kept in [`InferenceError::Status`].
const BODY_EXCERPT_LEN: usize = 200;

/// Errors from the inference service.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Inference request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Inference service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed inference response: {0}")]
    Malformed(String),

    #[error("Invalid inference configuration: {0}")]
    Config(String),
}

/// Anything that turns a prompt into an answer.
#[async_trait]
pub trait Inference: Send + Sync {
    async fn infer(&self, prompt: &Prompt) -> Result<Answer, InferenceError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Non-streaming chat client for an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(host: &str, model: &str, timeout: Duration) -> Result<Self, InferenceError> {
        if model.trim().is_empty() {
            return Err(InferenceError::Config("model cannot be empty".to_string()));
        }
        if timeout.is_zero() {
            return Err(InferenceError::Config("timeout must be non-zero".to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/api/chat", normalize_host(host)),
            model: model.to_string(),
        })
    }

    pub fn from_settings(settings: &LlmSettings) -> Result<Self, InferenceError> {
        Self::new(
            &settings.host,
            &settings.model,
            Duration::from_secs(settings.timeout_secs),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Inference for OllamaClient {
    async fn infer(&self, prompt: &Prompt) -> Result<Answer, InferenceError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.as_str(),
            }],
            stream: false,
        };

        tracing::debug!(url = %self.url, model = %self.model, "Sending chat request");
        let response = self.client.post(&self.url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let body = response.text().await?;
        let text = extract_answer(&body)?;
        tracing::info!(model = %self.model, chars = text.len(), "Inference completed");
        Ok(Answer {
            text,
            model: self.model.clone(),
        })
    }
}

/// Pull `message.content` out of a chat response body.
fn extract_answer(body: &str) -> Result<String, InferenceError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| InferenceError::Malformed(format!("invalid JSON: {e}")))?;
    parsed
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| InferenceError::Malformed("missing message.content".to_string()))
}

/// Add a scheme when missing and drop trailing slashes.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    /// Serve `router` on an ephemeral port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(host: &str) -> OllamaClient {
        OllamaClient::new(host, "llama3.2:latest", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn host_normalization() {
        assert_eq!(normalize_host("http://10.0.0.5:11434/"), "http://10.0.0.5:11434");
        assert_eq!(normalize_host("10.0.0.5:11434"), "http://10.0.0.5:11434");
        assert_eq!(normalize_host(" https://llm.example.com "), "https://llm.example.com");
    }

    #[test]
    fn rejects_zero_timeout_and_empty_model() {
        assert!(matches!(
            OllamaClient::new("localhost:11434", "m", Duration::ZERO),
            Err(InferenceError::Config(_))
        ));
        assert!(matches!(
            OllamaClient::new("localhost:11434", " ", Duration::from_secs(1)),
            Err(InferenceError::Config(_))
        ));
    }

    #[test]
    fn extract_requires_message_content() {
        assert_eq!(
            extract_answer(r#"{"message":{"role":"assistant","content":"hi"},"done":true}"#).unwrap(),
            "hi"
        );
        assert_eq!(extract_answer(r#"{"message":{"content":""}}"#).unwrap(), "");
        assert!(matches!(
            extract_answer(r#"{"message":{"role":"assistant"}}"#),
            Err(InferenceError::Malformed(_))
        ));
        assert!(matches!(
            extract_answer(r#"{"error":"model not found"}"#),
            Err(InferenceError::Malformed(_))
        ));
        assert!(matches!(extract_answer("not json"), Err(InferenceError::Malformed(_))));
    }

    #[test]
    fn excerpt_truncates_long_bodies() {
        let long = "x".repeat(500);
        let short = excerpt(&long);
        assert_eq!(short.len(), BODY_EXCERPT_LEN + 3);
        assert_eq!(excerpt(" short "), "short");
    }

    #[tokio::test]
    async fn sends_chat_request_and_reads_answer() {
        let router = Router::new().route(
            "/api/chat",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "llama3.2:latest");
                assert_eq!(body["stream"], false);
                assert_eq!(body["messages"][0]["role"], "user");
                let prompt = body["messages"][0]["content"].as_str().unwrap_or_default().to_string();
                Json(json!({
                    "model": "llama3.2:latest",
                    "message": {"role": "assistant", "content": format!("echo: {prompt}")},
                    "done": true
                }))
            }),
        );
        let host = serve(router).await;

        let answer = client(&host)
            .infer(&Prompt::new("What does Policy X require?"))
            .await
            .unwrap();
        assert_eq!(answer.text, "echo: What does Policy X require?");
        assert_eq!(answer.model, "llama3.2:latest");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let router = Router::new().route(
            "/api/chat",
            post(|| async { (StatusCode::NOT_FOUND, "model 'llama3.2:latest' not found") }),
        );
        let host = serve(router).await;

        let err = client(&host).infer(&Prompt::new("hi")).await.unwrap_err();
        match err {
            InferenceError::Status { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_answer_path_is_malformed() {
        let router = Router::new().route(
            "/api/chat",
            post(|| async { Json(json!({"done": true})) }),
        );
        let host = serve(router).await;

        let err = client(&host).infer(&Prompt::new("hi")).await.unwrap_err();
        assert!(matches!(err, InferenceError::Malformed(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"))
            .infer(&Prompt::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Transport(_)));
    }
}
