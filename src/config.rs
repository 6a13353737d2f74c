//! Session configuration
//!
//! Defaults, an optional TOML file, and CLI overrides layered in that order.
//! The TOML file uses the same names as the command-line flags:
//!
//! ```toml
//! url = "http://localhost:1234"
//! log = "./is_be_log"
//! interval = 0.0
//! max_context = 6000
//! compress_at = 5000
//! seed = "koan"
//! tools = true
//! ```

use crate::session::SeedDescriptor;
use crate::{CognitionError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:1234";
pub const DEFAULT_LOG_DIR: &str = "./is_be_log";
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 6000;
pub const DEFAULT_COMPRESS_AT_CHARS: usize = 5000;
/// Trailing characters of the context handed to the summarizer
pub const DEFAULT_COMPRESS_WINDOW_CHARS: usize = 2000;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_FAILURE_BACKOFF: Duration = Duration::from_secs(2);

/// Output budget and temperature for one kind of generation call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Sampling {
    /// Autonomous think turn: exploratory
    pub const THINK: Sampling = Sampling {
        max_output_tokens: 256,
        temperature: 0.85,
    };

    /// Reply to a human: longer and more coherent
    pub const DIALOG: Sampling = Sampling {
        max_output_tokens: 512,
        temperature: 0.7,
    };

    /// Summarization: short and close to deterministic
    pub const COMPRESS: Sampling = Sampling {
        max_output_tokens: 300,
        temperature: 0.5,
    };
}

/// Configuration for a cognition session
#[derive(Debug, Clone)]
pub struct CognitionConfig {
    /// Base URL of the OpenAI-compatible server (without `/v1`)
    pub api_url: String,

    /// Directory for the JSON-lines session log; `None` disables logging
    pub log_dir: Option<PathBuf>,

    /// Pause between thoughts; zero means continuous thinking
    pub thought_interval: Duration,

    /// Nominal context ceiling, in characters. Recorded and reported only;
    /// prompts always carry the whole context.
    pub max_context_chars: usize,

    /// Context length that triggers compression, in characters
    pub compress_at_chars: usize,

    /// Trailing characters summarized by a compression
    pub compress_window_chars: usize,

    /// HTTP request timeout for a single generation
    pub request_timeout: Duration,

    /// Hard cap on how long an interjection waits for its reply
    pub reply_timeout: Duration,

    /// Pause after a failed think turn
    pub failure_backoff: Duration,

    pub think: Sampling,
    pub dialog: Sampling,
    pub compress: Sampling,

    /// Initial context and capability preamble
    pub seed: SeedDescriptor,
}

impl Default for CognitionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            log_dir: Some(PathBuf::from(DEFAULT_LOG_DIR)),
            thought_interval: Duration::ZERO,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            compress_at_chars: DEFAULT_COMPRESS_AT_CHARS,
            compress_window_chars: DEFAULT_COMPRESS_WINDOW_CHARS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            failure_backoff: DEFAULT_FAILURE_BACKOFF,
            think: Sampling::THINK,
            dialog: Sampling::DIALOG,
            compress: Sampling::COMPRESS,
            seed: SeedDescriptor::default(),
        }
    }
}

impl CognitionConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn with_log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.log_dir = dir;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.thought_interval = interval;
        self
    }

    pub fn with_thresholds(mut self, max_context_chars: usize, compress_at_chars: usize) -> Self {
        self.max_context_chars = max_context_chars;
        self.compress_at_chars = compress_at_chars;
        self
    }

    pub fn with_compress_window(mut self, chars: usize) -> Self {
        self.compress_window_chars = chars;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }

    pub fn with_seed(mut self, seed: SeedDescriptor) -> Self {
        self.seed = seed;
        self
    }

    /// Human-readable pacing mode, as shown in status output
    pub fn mode_label(&self) -> String {
        if self.thought_interval.is_zero() {
            "continuous".to_string()
        } else {
            format!("every {:.1}s", self.thought_interval.as_secs_f64())
        }
    }

    /// Reject threshold combinations the loop cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.compress_at_chars == 0 {
            return Err(CognitionError::Config(
                "compress_at must be greater than zero".to_string(),
            ));
        }
        if self.compress_window_chars == 0 {
            return Err(CognitionError::Config(
                "compress_window must be greater than zero".to_string(),
            ));
        }
        if self.reply_timeout.is_zero() {
            return Err(CognitionError::Config(
                "reply_timeout must be greater than zero".to_string(),
            ));
        }
        if self.seed.initial_context().is_empty() {
            return Err(CognitionError::Config("seed text is empty".to_string()));
        }
        Ok(())
    }

    /// Overlay values present in a config file.
    pub fn apply_file(mut self, file: &FileConfig) -> Result<Self> {
        if let Some(url) = &file.url {
            self.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(log) = &file.log {
            self.log_dir = Some(log.clone());
        }
        if let Some(secs) = file.interval {
            self.thought_interval = interval_from_secs(secs)?;
        }
        if let Some(max) = file.max_context {
            self.max_context_chars = max;
        }
        if let Some(at) = file.compress_at {
            self.compress_at_chars = at;
        }
        if let Some(window) = file.compress_window {
            self.compress_window_chars = window;
        }
        if let Some(secs) = file.request_timeout {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.reply_timeout {
            self.reply_timeout = Duration::from_secs(secs);
        }
        Ok(self)
    }
}

/// Seconds between thoughts as a `Duration`. Negative values mean continuous.
pub fn interval_from_secs(secs: f64) -> Result<Duration> {
    if secs.is_nan() {
        return Err(CognitionError::Config("interval is not a number".to_string()));
    }
    Duration::try_from_secs_f64(secs.max(0.0))
        .map_err(|e| CognitionError::Config(format!("invalid interval {secs}: {e}")))
}

/// Optional on-disk configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub url: Option<String>,
    pub log: Option<PathBuf>,
    /// Seconds between thoughts
    pub interval: Option<f64>,
    pub max_context: Option<usize>,
    pub compress_at: Option<usize>,
    pub compress_window: Option<usize>,
    /// Seconds
    pub request_timeout: Option<u64>,
    /// Seconds
    pub reply_timeout: Option<u64>,
    pub seed: Option<String>,
    pub seed_file: Option<PathBuf>,
    pub tools: Option<bool>,
}

impl FileConfig {
    /// Parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// `<config dir>/persistent-cognition/config.toml`, if it exists.
    pub fn default_path() -> Option<PathBuf> {
        let path = dirs::config_dir()?
            .join("persistent-cognition")
            .join("config.toml");
        path.exists().then_some(path)
    }
}
