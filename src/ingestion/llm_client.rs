use crate::error::ExtractionError;
use crate::ingestion::response::LLMExtractionRequest;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use reqwest::blocking::Client as HttpClient;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One round-trip to a chat-completion service. Returns the raw response
/// payload; interpreting it is the caller's job.
pub trait LLMClient: Send + Sync {
    fn chat(&self, request: &LLMExtractionRequest) -> Result<Value, ExtractionError>;
}

/// Client for OpenAI-style `/chat/completions` endpoints with bearer auth.
pub struct ChatCompletionsClient {
    endpoint: String,
    api_key: String,
    model: String,
    http: HttpClient,
}

impl ChatCompletionsClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("impossible d'initialiser le client HTTP du modèle")?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            http,
        })
    }
}

impl LLMClient for ChatCompletionsClient {
    fn chat(&self, request: &LLMExtractionRequest) -> Result<Value, ExtractionError> {
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
        };
        debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            prompt_chars = request.user_prompt.chars().count(),
            "envoi de la requête d'extraction"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .map_err(|err| ExtractionError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| ExtractionError::Transport(format!("lecture du corps impossible: {err}")))?;
        debug!(status = status.as_u16(), body = %body, "réponse du modèle");

        if !status.is_success() {
            return Err(ExtractionError::Transport(format!(
                "statut HTTP {status}, réponse: {body}"
            )));
        }

        serde_json::from_str(&body).map_err(|err| {
            ExtractionError::MalformedResponse(format!("corps de réponse non JSON: {err}"))
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Scripted client: replays queued replies in order and counts calls.
#[derive(Clone, Default)]
pub struct MockLLMClient {
    replies: Arc<Mutex<VecDeque<Result<Value, ExtractionError>>>>,
    calls: Arc<AtomicUsize>,
}

impl MockLLMClient {
    pub fn push_reply(&self, reply: Result<Value, ExtractionError>) {
        self.replies.lock().push_back(reply);
    }

    /// Queues a well-formed payload whose message content is `content`.
    pub fn push_completion(&self, content: &str) {
        self.push_reply(Ok(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })));
    }

    pub fn push_failure(&self, error: ExtractionError) {
        self.push_reply(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LLMClient for MockLLMClient {
    fn chat(&self, _: &LLMExtractionRequest) -> Result<Value, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies.lock().pop_front().unwrap_or_else(|| {
            Err(ExtractionError::Transport(
                "aucune réponse mock disponible".to_string(),
            ))
        })
    }
}
