//! Persistent Cognition
//!
//! Drives an unattended stream-of-thought loop against an OpenAI-compatible
//! inference server:
//! - Accumulates generated text into a single growing context
//! - Compresses the context into a "core memory" when it grows too large
//! - Lets an operator interject, receive a reply, and let the loop resume

pub mod backend;
pub mod config;
pub mod session;
pub mod shell;

pub use backend::{Generation, GenerationBackend, GenerationRequest, OpenAiCompatBackend, Prompt};
pub use config::{CognitionConfig, Sampling};
pub use session::{
    CognitionSession, LoopState, Reply, SeedDescriptor, SessionEvent, StatusSnapshot,
};

/// Result type for cognition operations
pub type Result<T> = std::result::Result<T, CognitionError>;

/// Errors that can occur in the cognition engine
#[derive(Debug, thiserror::Error)]
pub enum CognitionError {
    /// Connection or setup failure. Fatal at startup, retried mid-session.
    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),

    /// The backend answered with an error status or timed out.
    #[error("Backend request failed: {0}")]
    BackendRequest(String),

    /// The backend answered but without the expected fields.
    #[error("Malformed backend response: {0}")]
    BackendMalformedResponse(String),

    #[error("No response within {0:?}")]
    InterjectionTimeout(std::time::Duration),

    #[error("Session stopped")]
    SessionStopped,

    #[error("Compression failed: {0}")]
    CompressionFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
