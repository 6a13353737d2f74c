//! OpenAI-compatible backend (LM Studio, Ollama, llama.cpp server, ...)
//!
//! Prefers the raw completions endpoint, which continues the context as-is.
//! Servers that only speak chat get the same prompt as a single user message.

use super::{ChatMessage, Generation, GenerationBackend, GenerationRequest, Prompt};
use crate::{CognitionError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ERROR_DETAIL_CHARS: usize = 500;

// ─── Wire types ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

// ─── Backend ────────────────────────────────────────────────────────

/// HTTP backend for servers exposing `/v1/completions` and `/v1/chat/completions`
pub struct OpenAiCompatBackend {
    client: Client,
    base_url: String,
    /// Model id discovered by `identify`, sent with every request once known
    model: RwLock<Option<String>>,
}

impl OpenAiCompatBackend {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("persistent-cognition/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CognitionError::BackendUnreachable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn complete(&self, prompt: &str, request: &GenerationRequest) -> Result<Generation> {
        let url = format!("{}/v1/completions", self.base_url);
        let model = self.model.read().await.clone();
        let body = CompletionRequest {
            model: model.as_deref(),
            prompt,
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            repeat_penalty: request.repetition_penalty,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;
        let response = Self::check_response_status(response).await?;
        let parsed: CompletionResponse = Self::decode(response).await?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| CognitionError::BackendMalformedResponse("no choices".to_string()))?;

        Ok(Generation {
            text,
            completion_tokens: parsed.usage.map(|u| u.completion_tokens).unwrap_or(0),
        })
    }

    async fn chat(&self, messages: &[ChatMessage], request: &GenerationRequest) -> Result<Generation> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let model = self.model.read().await.clone();
        let body = ChatRequest {
            model: model.as_deref(),
            messages,
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            repeat_penalty: request.repetition_penalty,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;
        let response = Self::check_response_status(response).await?;
        let parsed: ChatResponse = Self::decode(response).await?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| CognitionError::BackendMalformedResponse("no choices".to_string()))?;

        Ok(Generation {
            text,
            completion_tokens: parsed.usage.map(|u| u.completion_tokens).unwrap_or(0),
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body = response.text().await.map_err(Self::map_reqwest_error)?;
        serde_json::from_str(&body)
            .map_err(|e| CognitionError::BackendMalformedResponse(e.to_string()))
    }

    async fn check_response_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = Self::truncate_error_detail(&Self::extract_error_detail(&body));
        if detail.is_empty() {
            return Err(CognitionError::BackendRequest(format!("API error {status}")));
        }
        Err(CognitionError::BackendRequest(format!(
            "API error {status}: {detail}"
        )))
    }

    fn extract_error_detail(body: &str) -> String {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return String::new();
        }

        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(msg) = value
                .get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str())
            {
                return msg.to_string();
            }
            if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
                return msg.to_string();
            }
        }

        trimmed.to_string()
    }

    fn truncate_error_detail(detail: &str) -> String {
        if detail.chars().count() <= MAX_ERROR_DETAIL_CHARS {
            return detail.to_string();
        }

        let mut truncated = detail.chars().take(MAX_ERROR_DETAIL_CHARS).collect::<String>();
        truncated.push_str("... [truncated]");
        truncated
    }

    fn map_reqwest_error(e: reqwest::Error) -> CognitionError {
        if e.is_connect() {
            CognitionError::BackendUnreachable(e.to_string())
        } else if e.is_timeout() {
            CognitionError::BackendRequest(format!("timeout: {e}"))
        } else if e.is_decode() {
            CognitionError::BackendMalformedResponse(e.to_string())
        } else {
            CognitionError::BackendRequest(e.to_string())
        }
    }
}

#[async_trait]
impl GenerationBackend for OpenAiCompatBackend {
    async fn identify(&self) -> Result<String> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| CognitionError::BackendUnreachable(format!("{url}: {e}")))?;
        let response = Self::check_response_status(response)
            .await
            .map_err(|e| CognitionError::BackendUnreachable(e.to_string()))?;
        let models: ModelList = Self::decode(response)
            .await
            .map_err(|e| CognitionError::BackendUnreachable(e.to_string()))?;

        let id = models
            .data
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| CognitionError::BackendUnreachable("no model loaded".to_string()))?;

        info!("Backend ready: url={}, model={}", self.base_url, id);
        *self.model.write().await = Some(id.clone());
        Ok(id)
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
        debug!(
            "Generating: prompt={} chars, max_tokens={}, temperature={}",
            request.input.char_len(),
            request.max_output_tokens,
            request.temperature
        );

        match &request.input {
            Prompt::Text(prompt) => match self.complete(prompt, &request).await {
                Ok(generation) => Ok(generation),
                Err(e) => {
                    warn!("Completions endpoint failed ({}), falling back to chat", e);
                    let messages = request.input.clone().into_messages();
                    self.chat(&messages, &request).await
                }
            },
            Prompt::Messages(messages) => self.chat(messages, &request).await,
        }
    }
}
