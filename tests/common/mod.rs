//! Shared helpers for session tests

#![allow(dead_code)]

use async_trait::async_trait;
use persistent_cognition::session::{CognitionSession, SeedDescriptor, StatusSnapshot, COMPRESS_INSTRUCTION};
use persistent_cognition::{CognitionConfig, CognitionError, Generation, GenerationBackend, GenerationRequest, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Responder = dyn Fn(&GenerationRequest, usize) -> Result<Generation> + Send + Sync;

/// Backend driven by a closure, recording every request
pub struct ScriptedBackend {
    respond: Box<Responder>,
    delay: Duration,
    identify_fails: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&GenerationRequest, usize) -> Result<Generation> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            delay: Duration::ZERO,
            identify_fails: false,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers `text`
    pub fn fixed(text: &'static str) -> Self {
        Self::new(move |_, _| Ok(reply(text)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unreachable() -> Self {
        Self {
            identify_fails: true,
            ..Self::fixed("")
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn identify(&self) -> Result<String> {
        if self.identify_fails {
            return Err(CognitionError::BackendUnreachable("connection refused".to_string()));
        }
        Ok("scripted-model".to_string())
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let result = (self.respond)(&request, index);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn reply(text: &str) -> Generation {
    Generation {
        text: text.to_string(),
        completion_tokens: text.split_whitespace().count() as u64,
    }
}

pub fn is_compression(request: &GenerationRequest) -> bool {
    request
        .prompt_text()
        .is_some_and(|p| p.starts_with(COMPRESS_INSTRUCTION))
}

pub fn is_dialog(request: &GenerationRequest) -> bool {
    request.prompt_text().is_some_and(|p| p.contains("[human]: "))
}

/// Config with logging off and a body-only seed
pub fn config(seed: &str, max_context: usize, compress_at: usize) -> CognitionConfig {
    CognitionConfig::new("http://scripted.invalid")
        .with_log_dir(None)
        .with_thresholds(max_context, compress_at)
        .with_failure_backoff(Duration::from_millis(50))
        .with_reply_timeout(Duration::from_secs(5))
        .with_seed(SeedDescriptor::body_only(seed))
}

/// Poll the session's status until `done` holds, or panic after `timeout`.
pub async fn wait_until<F>(session: &CognitionSession, timeout: Duration, done: F) -> StatusSnapshot
where
    F: Fn(&StatusSnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let status = session.status();
        if done(&status) {
            return status;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached within {:?}; last status: {:?}", timeout, status);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
