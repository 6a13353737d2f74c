//! Session core
//!
//! Owns the lifecycle of one stream of thought: seeding, the loop actor,
//! interjections, telemetry and the event log.

mod cognition;
mod compress;
mod context;
mod events;
mod interject;
mod log;
mod seed;
mod telemetry;

pub use cognition::{CognitionLoop, Session};
pub use compress::{
    CompressionEngine, CompressionOutcome, COMPRESS_INSTRUCTION, CONTINUATION_CUE,
    CONTINUATION_CUE_WITH_TOOLS, MEMORY_PREFIX,
};
pub use context::{tail_chars, ContextStore, SEPARATOR};
pub use events::{EventDetail, SessionEvent};
pub use interject::{Interjection, InterjectionChannel, Reply, NO_RESPONSE};
pub use log::SessionLog;
pub use seed::{SeedDescriptor, SEEDS, TOOL_PREAMBLE};
pub use telemetry::{format_uptime, LoopState, StatusSnapshot, TelemetryReader};

use crate::backend::GenerationBackend;
use crate::config::CognitionConfig;
use crate::Result;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Buffered events per slow subscriber before it starts lagging
const EVENT_CAPACITY: usize = 256;

/// A running session: control surface for the loop actor
pub struct CognitionSession {
    channel: Arc<InterjectionChannel>,
    telemetry: TelemetryReader,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<Session>>>,
    reply_timeout: std::time::Duration,
    log_path: Option<PathBuf>,
}

impl CognitionSession {
    /// Probe the backend, seed the context and spawn the loop.
    ///
    /// An unreachable backend here is fatal and returned to the caller.
    pub async fn start(config: CognitionConfig, backend: Arc<dyn GenerationBackend>) -> Result<Self> {
        config.validate()?;
        let model = backend.identify().await?;

        let born_at = Local::now();
        let log = match &config.log_dir {
            Some(dir) => SessionLog::create(dir, born_at).await?,
            None => SessionLog::disabled(),
        };
        let log_path = log.path().map(Path::to_path_buf);

        let context = ContextStore::new(config.seed.initial_context());
        let (publisher, reader) =
            telemetry::telemetry(context.snapshot(), born_at, model.clone(), config.mode_label());

        let cancel = CancellationToken::new();
        let channel = Arc::new(InterjectionChannel::new(cancel.clone()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        info!(
            "Session started: model={}, seed={} chars, tools={}, log={:?}",
            model,
            context.current_length(),
            config.seed.has_capabilities(),
            log_path
        );

        let reply_timeout = config.reply_timeout;
        let cognition = CognitionLoop::new(
            Session::new(born_at, model, &config),
            context,
            backend,
            channel.clone(),
            publisher,
            log,
            events.clone(),
            config,
            cancel.clone(),
        );
        let task = tokio::spawn(cognition.run());

        Ok(Self {
            channel,
            telemetry: reader,
            events,
            cancel,
            task: Mutex::new(Some(task)),
            reply_timeout,
            log_path,
        })
    }

    /// Interject and wait for the reply, up to the configured reply timeout.
    pub async fn submit(&self, message: impl Into<String>) -> Reply {
        match self.try_submit(message).await {
            Ok(reply) => Reply::Spoken(reply),
            Err(e) => {
                warn!("Interjection got no reply: {}", e);
                Reply::NoResponse
            }
        }
    }

    /// Like `submit`, but reports why no reply arrived.
    pub async fn try_submit(&self, message: impl Into<String>) -> Result<String> {
        self.channel.submit(message, self.reply_timeout).await
    }

    /// Committed status; never waits on the loop.
    pub fn status(&self) -> StatusSnapshot {
        self.telemetry.snapshot()
    }

    pub fn state(&self) -> LoopState {
        self.telemetry.state()
    }

    /// Last `n` characters of the committed context
    pub fn context_tail(&self, n: usize) -> String {
        tail_chars(&self.telemetry.context(), n).to_string()
    }

    /// Receive every event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Observer handle that outlives borrows of the session
    pub fn telemetry(&self) -> TelemetryReader {
        self.telemetry.clone()
    }

    pub fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled() && self.telemetry.state() != LoopState::Stopped
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Token that stops the session when cancelled (e.g. from a signal handler)
    pub fn stop_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the loop, wait for it to finish, and return the final status.
    pub async fn stop(&self) -> StatusSnapshot {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("Cognition loop ended abnormally: {}", e);
            }
        }
        self.status()
    }
}

impl Drop for CognitionSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
