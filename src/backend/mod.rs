//! Generation backend
//!
//! The loop only needs "text in, text plus token count out". The trait keeps
//! the HTTP client swappable so sessions can run against a scripted backend.

mod openai;

pub use openai::OpenAiCompatBackend;

use crate::config::Sampling;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP_P: f32 = 0.9;
pub const DEFAULT_REPETITION_PENALTY: f32 = 1.15;

/// One chat message for chat-style backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Prompt shape accepted by a backend
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    /// Raw completion prompt
    Text(String),
    /// Chat transcript
    Messages(Vec<ChatMessage>),
}

impl Prompt {
    /// Character length of the prompt content
    pub fn char_len(&self) -> usize {
        match self {
            Prompt::Text(text) => text.chars().count(),
            Prompt::Messages(messages) => messages.iter().map(|m| m.content.chars().count()).sum(),
        }
    }

    /// Flatten to chat messages (a text prompt becomes one user message)
    pub fn into_messages(self) -> Vec<ChatMessage> {
        match self {
            Prompt::Text(text) => vec![ChatMessage::user(text)],
            Prompt::Messages(messages) => messages,
        }
    }
}

/// A generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub input: Prompt,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>, sampling: Sampling) -> Self {
        Self {
            input: Prompt::Text(prompt.into()),
            max_output_tokens: sampling.max_output_tokens,
            temperature: sampling.temperature,
            top_p: DEFAULT_TOP_P,
            repetition_penalty: DEFAULT_REPETITION_PENALTY,
        }
    }

    pub fn prompt_text(&self) -> Option<&str> {
        match &self.input {
            Prompt::Text(text) => Some(text),
            Prompt::Messages(_) => None,
        }
    }
}

/// Generated text plus the completion token count reported by the server
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Generation {
    pub text: String,
    pub completion_tokens: u64,
}

/// Something that turns prompts into generated text
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Probe the backend and return the identity of the loaded model.
    async fn identify(&self) -> Result<String>;

    /// Generate a continuation. May fail transiently.
    async fn generate(&self, request: GenerationRequest) -> Result<Generation>;
}
