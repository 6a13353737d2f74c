//! Read-only status projection
//!
//! The loop publishes committed counters and the committed context through
//! watch channels after every turn; readers clone the latest value and never
//! touch the loop's own state.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// What the loop actor is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Thinking,
    Compressing,
    Responding,
    Stopped,
}

impl LoopState {
    /// True while a backend call for a turn is in flight
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            LoopState::Thinking | LoopState::Compressing | LoopState::Responding
        )
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoopState::Idle => "idle",
            LoopState::Thinking => "thinking",
            LoopState::Compressing => "compressing",
            LoopState::Responding => "responding",
            LoopState::Stopped => "stopped",
        };
        write!(f, "{}", label)
    }
}

/// Counters as of the last committed turn
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    pub state: LoopState,
    pub thoughts: u64,
    pub compressions: u64,
    pub total_tokens: u64,
    pub context_length: usize,
    pub avg_think_seconds: f64,
}

impl Committed {
    fn initial(context_length: usize) -> Self {
        Self {
            state: LoopState::Idle,
            thoughts: 0,
            compressions: 0,
            total_tokens: 0,
            context_length,
            avg_think_seconds: 0.0,
        }
    }
}

/// Point-in-time status of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    #[serde(serialize_with = "serialize_uptime")]
    pub uptime: Duration,
    pub thoughts: u64,
    pub compressions: u64,
    pub context_length: usize,
    pub total_tokens: u64,
    pub avg_think_seconds: f64,
    pub state: LoopState,
    pub mode: String,
    pub model: String,
    pub born_at: DateTime<Local>,
}

impl StatusSnapshot {
    pub fn uptime_label(&self) -> String {
        format_uptime(self.uptime)
    }
}

fn serialize_uptime<S: serde::Serializer>(uptime: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_uptime(*uptime))
}

/// `H:MM:SS`, whole seconds
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Loop-side half: publishes committed state
#[derive(Debug)]
pub struct TelemetryPublisher {
    committed: watch::Sender<Committed>,
    context: watch::Sender<Arc<str>>,
}

impl TelemetryPublisher {
    pub fn set_state(&self, state: LoopState) {
        self.committed.send_modify(|c| c.state = state);
    }

    pub fn commit(&self, committed: Committed, context: Arc<str>) {
        self.committed.send_replace(committed);
        self.context.send_replace(context);
    }

    pub fn state(&self) -> LoopState {
        self.committed.borrow().state
    }
}

/// Observer-side half: cheap to clone, never blocks the loop
#[derive(Debug, Clone)]
pub struct TelemetryReader {
    committed: watch::Receiver<Committed>,
    context: watch::Receiver<Arc<str>>,
    started: Instant,
    born_at: DateTime<Local>,
    model: String,
    mode: String,
}

impl TelemetryReader {
    pub fn snapshot(&self) -> StatusSnapshot {
        let committed = self.committed.borrow().clone();
        StatusSnapshot {
            uptime: self.started.elapsed(),
            thoughts: committed.thoughts,
            compressions: committed.compressions,
            context_length: committed.context_length,
            total_tokens: committed.total_tokens,
            avg_think_seconds: committed.avg_think_seconds,
            state: committed.state,
            mode: self.mode.clone(),
            model: self.model.clone(),
            born_at: self.born_at,
        }
    }

    pub fn state(&self) -> LoopState {
        self.committed.borrow().state
    }

    /// The committed context as of the last turn
    pub fn context(&self) -> Arc<str> {
        self.context.borrow().clone()
    }

    /// Resolves once the loop reports `state`.
    pub async fn wait_for_state(&mut self, state: LoopState) -> bool {
        self.committed.wait_for(|c| c.state == state).await.is_ok()
    }
}

/// Create the publisher/reader pair for a freshly seeded context.
pub fn telemetry(
    initial_context: Arc<str>,
    born_at: DateTime<Local>,
    model: String,
    mode: String,
) -> (TelemetryPublisher, TelemetryReader) {
    let (committed_tx, committed_rx) =
        watch::channel(Committed::initial(initial_context.chars().count()));
    let (context_tx, context_rx) = watch::channel(initial_context);
    (
        TelemetryPublisher {
            committed: committed_tx,
            context: context_tx,
        },
        TelemetryReader {
            committed: committed_rx,
            context: context_rx,
            started: Instant::now(),
            born_at,
            model,
            mode,
        },
    )
}
