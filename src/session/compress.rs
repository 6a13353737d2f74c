//! Context compression
//!
//! When the context grows past the trigger length, the trailing window is
//! distilled by the backend into a "core memory" and the context is rebuilt
//! from it:
//!   1. Take the last `window` characters of the context
//!   2. Ask for durable insights and open questions only
//!   3. Replace the context with preamble + core memory + continuation cue
//!
//! A failed summary leaves the context untouched; the next over-threshold
//! check retries.

use super::context::{tail_chars, ContextStore};
use crate::backend::{GenerationBackend, GenerationRequest};
use crate::config::Sampling;
use crate::{CognitionError, Result};
use tracing::{debug, info};

/// Instruction wrapped around the window sent for summarization
pub const COMPRESS_INSTRUCTION: &str = "From the stream of thought below, extract only the most important insights and the questions that remain open. \
Do not write conclusions or a wrap-up. Keep only the core insights and the questions worth exploring next.";

/// Marks the summary inside the rebuilt context
pub const MEMORY_PREFIX: &str = "[core memory]: ";

/// Closes a rebuilt context so the next think turn has somewhere to go
pub const CONTINUATION_CUE: &str = "\n\nWhat lies beyond this? Keep exploring:\n";

/// Continuation cue used when a capability preamble is present
pub const CONTINUATION_CUE_WITH_TOOLS: &str =
    "\n\nWhat lies beyond this? Keep exploring, using the tools where they help:\n";

/// Result of one successful compression
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOutcome {
    pub summary: String,
    pub before_chars: usize,
    pub after_chars: usize,
}

impl CompressionOutcome {
    /// New length over old length
    pub fn ratio(&self) -> f64 {
        if self.before_chars == 0 {
            return 1.0;
        }
        self.after_chars as f64 / self.before_chars as f64
    }
}

/// Rebuilds an oversized context around a backend-generated summary
#[derive(Debug, Clone)]
pub struct CompressionEngine {
    preamble: String,
    window_chars: usize,
    sampling: Sampling,
}

impl CompressionEngine {
    pub fn new(preamble: impl Into<String>, window_chars: usize, sampling: Sampling) -> Self {
        Self {
            preamble: preamble.into(),
            window_chars,
            sampling,
        }
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Summarization prompt over the trailing window of `context`
    pub fn build_prompt(&self, context: &str) -> String {
        format!(
            "{}\n\nThoughts:\n{}\n\nCore:",
            COMPRESS_INSTRUCTION,
            tail_chars(context, self.window_chars)
        )
    }

    /// The context that replaces the old one
    pub fn rebuild(&self, summary: &str) -> String {
        let cue = if self.preamble.is_empty() {
            CONTINUATION_CUE
        } else {
            CONTINUATION_CUE_WITH_TOOLS
        };
        format!("{}{}{}{}", self.preamble, MEMORY_PREFIX, summary, cue)
    }

    /// Run one compression cycle against `store`.
    ///
    /// On error the store is unchanged.
    pub async fn compress(
        &self,
        store: &mut ContextStore,
        backend: &dyn GenerationBackend,
    ) -> Result<CompressionOutcome> {
        let before_chars = store.current_length();
        let prompt = self.build_prompt(store.as_str());
        debug!(
            "Compressing {} chars (window {}, prompt {} chars)",
            before_chars,
            self.window_chars,
            prompt.chars().count()
        );

        let generation = backend
            .generate(GenerationRequest::text(prompt, self.sampling))
            .await
            .map_err(|e| CognitionError::CompressionFailure(e.to_string()))?;

        let summary = generation.text.trim().to_string();
        if summary.is_empty() {
            return Err(CognitionError::CompressionFailure(
                "backend returned an empty summary".to_string(),
            ));
        }

        store.replace(self.rebuild(&summary));
        let after_chars = store.current_length();

        info!(
            "Context compressed: {} chars -> {} chars",
            before_chars, after_chars
        );

        Ok(CompressionOutcome {
            summary,
            before_chars,
            after_chars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Generation;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingBackend {
        reply: Result<String>,
        prompts: Mutex<Vec<GenerationRequest>>,
    }

    impl RecordingBackend {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(CognitionError::BackendRequest("boom".to_string())),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for RecordingBackend {
        async fn identify(&self) -> Result<String> {
            Ok("recording".to_string())
        }

        async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
            self.prompts.lock().unwrap().push(request);
            match &self.reply {
                Ok(text) => Ok(Generation {
                    text: text.clone(),
                    completion_tokens: 1,
                }),
                Err(_) => Err(CognitionError::BackendRequest("boom".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_compress_rebuilds_from_summary() {
        let engine = CompressionEngine::new("", 2000, Sampling::COMPRESS);
        let backend = RecordingBackend::replying("  insight; open question?  ");
        let mut store = ContextStore::new("x".repeat(500));

        let outcome = engine.compress(&mut store, &backend).await.unwrap();

        assert_eq!(outcome.before_chars, 500);
        assert_eq!(outcome.summary, "insight; open question?");
        assert_eq!(
            store.as_str(),
            format!("{MEMORY_PREFIX}insight; open question?{CONTINUATION_CUE}")
        );
        assert_eq!(outcome.after_chars, store.current_length());
        assert!(outcome.ratio() < 1.0);
    }

    #[tokio::test]
    async fn test_compress_uses_low_temperature_and_small_budget() {
        let engine = CompressionEngine::new("", 2000, Sampling::COMPRESS);
        let backend = RecordingBackend::replying("core");
        let mut store = ContextStore::new("thoughts");

        engine.compress(&mut store, &backend).await.unwrap();

        let requests = backend.prompts.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, 0.5);
        assert_eq!(requests[0].max_output_tokens, 300);
    }

    #[test]
    fn test_prompt_only_covers_trailing_window() {
        let engine = CompressionEngine::new("", 10, Sampling::COMPRESS);
        let context = format!("{}{}", "old".repeat(50), "0123456789");
        let prompt = engine.build_prompt(&context);
        assert!(prompt.contains("Thoughts:\n0123456789\n"));
        assert!(!prompt.contains("old"));
        assert!(prompt.starts_with(COMPRESS_INSTRUCTION));
    }

    #[tokio::test]
    async fn test_preamble_survives_compression() {
        let preamble = "[Available tools]\n- [TOOL:search:q]\n\n";
        let engine = CompressionEngine::new(preamble, 2000, Sampling::COMPRESS);
        let backend = RecordingBackend::replying("kept");
        let mut store = ContextStore::new(format!("{preamble}{}", "y".repeat(300)));

        engine.compress(&mut store, &backend).await.unwrap();
        assert!(store.as_str().starts_with(preamble));
        assert!(store.as_str().ends_with(CONTINUATION_CUE_WITH_TOOLS));

        // A second pass over an already-small context never eats the preamble.
        engine.compress(&mut store, &backend).await.unwrap();
        assert!(store.as_str().starts_with(preamble));
        assert!(store.current_length() >= preamble.chars().count());
    }

    #[tokio::test]
    async fn test_failed_compression_leaves_context() {
        let engine = CompressionEngine::new("", 2000, Sampling::COMPRESS);
        let backend = RecordingBackend::failing();
        let original = "z".repeat(400);
        let mut store = ContextStore::new(original.clone());

        let err = engine.compress(&mut store, &backend).await.unwrap_err();
        assert!(matches!(err, CognitionError::CompressionFailure(_)));
        assert_eq!(store.as_str(), original);
    }

    #[tokio::test]
    async fn test_empty_summary_is_a_failure() {
        let engine = CompressionEngine::new("", 2000, Sampling::COMPRESS);
        let backend = RecordingBackend::replying("   \n");
        let mut store = ContextStore::new("keep me");

        assert!(engine.compress(&mut store, &backend).await.is_err());
        assert_eq!(store.as_str(), "keep me");
    }
}
