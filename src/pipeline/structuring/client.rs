use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::LlmClient;
use super::RemoteExtractionError;
use crate::config;

/// OpenAI-style chat-completion client (Mistral by default).
pub struct ChatCompletionClient {
    api_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl ChatCompletionClient {
    /// `api_key = None` builds a client whose every call fails with
    /// `MissingCredential`, so callers drop straight to the fallback.
    pub fn new(
        api_url: &str,
        api_key: Option<String>,
        model: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, RemoteExtractionError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| RemoteExtractionError::HttpClient(e.to_string()))?;

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
            client,
            timeout,
        })
    }

    pub fn from_config(cfg: &config::AppConfig) -> Result<Self, RemoteExtractionError> {
        Self::new(&cfg.api_url, cfg.api_key.clone(), &cfg.model, cfg.ai_timeout)
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmClient for ChatCompletionClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, RemoteExtractionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(RemoteExtractionError::MissingCredential)?;

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: config::EXTRACTION_TEMPERATURE,
            max_tokens: config::EXTRACTION_MAX_TOKENS,
        };

        tracing::debug!(url = %self.api_url, model = %self.model, "Sending extraction request");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::warn!(timeout = ?self.timeout, "Extraction request timed out");
                    RemoteExtractionError::Timeout
                } else if e.is_connect() {
                    RemoteExtractionError::Connection(self.api_url.clone())
                } else {
                    RemoteExtractionError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteExtractionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RemoteExtractionError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                RemoteExtractionError::MalformedResponse("response has no message content".into())
            })
    }
}

/// Mock LLM client for testing: returns a fixed reply and records prompts.
pub struct MockLlmClient {
    reply: Result<String, RemoteExtractionError>,
    calls: AtomicUsize,
    last_user_prompt: Mutex<Option<String>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self::with_reply(Ok(response.to_string()))
    }

    pub fn failing(error: RemoteExtractionError) -> Self {
        Self::with_reply(Err(error))
    }

    fn with_reply(reply: Result<String, RemoteExtractionError>) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            last_user_prompt: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_user_prompt(&self) -> Option<String> {
        self.last_user_prompt.lock().ok().and_then(|p| p.clone())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, RemoteExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_user_prompt.lock() {
            *last = Some(user.to_string());
        }
        self.reply.clone()
    }
}
