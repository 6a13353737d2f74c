//! The cognition loop actor
//!
//! One task owns the session counters and the context and runs every turn:
//!
//! ```text
//! Idle ──> Thinking ──> (Compressing) ──> Idle
//!   └────> Responding ──> (Compressing) ──> Idle
//! ```
//!
//! A pending interjection always wins over a new thought. Every failure path
//! returns to `Idle`; only a stop ends the loop.

use super::compress::CompressionEngine;
use super::context::ContextStore;
use super::events::{round_to, EventDetail, SessionEvent};
use super::interject::{Interjection, InterjectionChannel};
use super::log::SessionLog;
use super::telemetry::{Committed, LoopState, TelemetryPublisher};
use crate::backend::{Generation, GenerationBackend, GenerationRequest};
use crate::config::CognitionConfig;
use crate::{CognitionError, Result};
use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause between thoughts in continuous mode; still an interruption point
const CONTINUOUS_PAUSE: Duration = Duration::from_millis(10);

/// Session aggregate, owned and mutated only by the loop
#[derive(Debug, Clone)]
pub struct Session {
    pub born_at: DateTime<Local>,
    pub model: String,
    pub max_context_chars: usize,
    pub compress_at_chars: usize,
    pub thought_count: u64,
    pub compression_count: u64,
    pub total_tokens: u64,
    /// Wall time spent in counted think turns
    pub think_time: Duration,
    event_seq: u64,
}

impl Session {
    pub fn new(born_at: DateTime<Local>, model: String, config: &CognitionConfig) -> Self {
        Self {
            born_at,
            model,
            max_context_chars: config.max_context_chars,
            compress_at_chars: config.compress_at_chars,
            thought_count: 0,
            compression_count: 0,
            total_tokens: 0,
            think_time: Duration::ZERO,
            event_seq: 0,
        }
    }

    pub fn avg_think_seconds(&self) -> f64 {
        if self.thought_count == 0 {
            return 0.0;
        }
        self.think_time.as_secs_f64() / self.thought_count as f64
    }

    fn next_seq(&mut self) -> u64 {
        self.event_seq += 1;
        self.event_seq
    }
}

/// Everything the loop needs, moved into its task
pub struct CognitionLoop {
    session: Session,
    context: ContextStore,
    compressor: CompressionEngine,
    backend: Arc<dyn GenerationBackend>,
    channel: Arc<InterjectionChannel>,
    telemetry: TelemetryPublisher,
    log: SessionLog,
    events: broadcast::Sender<SessionEvent>,
    config: CognitionConfig,
    cancel: CancellationToken,
}

impl CognitionLoop {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session: Session,
        context: ContextStore,
        backend: Arc<dyn GenerationBackend>,
        channel: Arc<InterjectionChannel>,
        telemetry: TelemetryPublisher,
        log: SessionLog,
        events: broadcast::Sender<SessionEvent>,
        config: CognitionConfig,
        cancel: CancellationToken,
    ) -> Self {
        let compressor = CompressionEngine::new(
            config.seed.capability_preamble.clone(),
            config.compress_window_chars,
            config.compress,
        );
        Self {
            session,
            context,
            compressor,
            backend,
            channel,
            telemetry,
            log,
            events,
            config,
            cancel,
        }
    }

    /// Run until stopped. Returns the final session aggregate.
    pub async fn run(mut self) -> Session {
        info!(
            "Cognition loop started: model={}, seed={} chars, mode={}, compress_at={}, max_context={}",
            self.session.model,
            self.context.current_length(),
            self.config.mode_label(),
            self.session.compress_at_chars,
            self.session.max_context_chars
        );

        while !self.cancel.is_cancelled() {
            if let Some(interjection) = self.channel.take() {
                self.respond(interjection).await;
                continue;
            }

            if let Err(e) = self.think_once().await {
                if self.cancel.is_cancelled() {
                    break;
                }
                warn!("Think turn failed: {}. Retrying in {:?}", e, self.config.failure_backoff);
                tokio::select! {
                    _ = tokio::time::sleep(self.config.failure_backoff) => {}
                    _ = self.cancel.cancelled() => {}
                }
                continue;
            }

            let pause = if self.config.thought_interval.is_zero() {
                CONTINUOUS_PAUSE
            } else {
                self.config.thought_interval
            };
            self.channel.wait(pause).await;
        }

        self.channel.close();
        self.telemetry.set_state(LoopState::Stopped);
        info!(
            "Cognition loop stopped after {} thoughts, {} compressions",
            self.session.thought_count, self.session.compression_count
        );
        self.session
    }

    /// Backend call that gives way to a stop
    async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CognitionError::SessionStopped),
            result = self.backend.generate(request) => result,
        }
    }

    async fn think_once(&mut self) -> Result<()> {
        self.telemetry.set_state(LoopState::Thinking);
        let result = self.think_turn().await;
        self.telemetry.set_state(LoopState::Idle);
        result
    }

    async fn think_turn(&mut self) -> Result<()> {
        let started = Instant::now();
        let request = GenerationRequest::text(self.context.as_str(), self.config.think);
        let generation = self.generate(request).await?;

        let thought = generation.text.trim();
        if thought.is_empty() {
            debug!("Empty thought discarded");
            return Ok(());
        }

        let elapsed = started.elapsed();
        let tokens = generation.completion_tokens;
        self.session.thought_count += 1;
        self.session.total_tokens += tokens;
        self.session.think_time += elapsed;
        let context_chars = self.context.append(thought);

        let secs = elapsed.as_secs_f64();
        let tokens_per_sec = if secs > 0.0 { tokens as f64 / secs } else { 0.0 };
        debug!(
            "Thought #{}: {} tokens in {:.1}s, context {} chars",
            self.session.thought_count, tokens, secs, context_chars
        );

        self.record(
            thought.to_string(),
            EventDetail::Thought {
                duration_sec: round_to(secs, 2),
                tokens_generated: tokens,
                tokens_per_sec: round_to(tokens_per_sec, 1),
            },
        )
        .await;
        self.commit();

        self.maybe_compress().await;
        Ok(())
    }

    async fn respond(&mut self, interjection: Interjection) {
        self.telemetry.set_state(LoopState::Responding);

        let message = interjection.message().to_string();
        let injection = format!("\n\n[human]: {}\n\n[response]:\n", message);
        let prompt = format!("{}{}", self.context.as_str(), injection);
        info!("Interjection received ({} chars)", message.chars().count());

        match self.generate(GenerationRequest::text(prompt, self.config.dialog)).await {
            Ok(generation) => {
                let reply = generation.text.trim().to_string();
                self.context.append_raw(&injection);
                self.context.append(&reply);
                self.session.total_tokens += generation.completion_tokens;

                self.record(reply.clone(), EventDetail::Dialog { human: message })
                    .await;
                self.commit();

                if !interjection.respond(reply) {
                    debug!("Submitter left before the reply was ready");
                }
                self.maybe_compress().await;
            }
            Err(e) => {
                if !self.cancel.is_cancelled() {
                    warn!("Dialog turn failed: {}", e);
                }
                // Dropping the interjection releases the submitter with no reply.
                drop(interjection);
            }
        }

        self.telemetry.set_state(LoopState::Idle);
    }

    async fn maybe_compress(&mut self) {
        if self.context.current_length() <= self.session.compress_at_chars {
            return;
        }

        self.telemetry.set_state(LoopState::Compressing);
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CognitionError::SessionStopped),
            result = self.compressor.compress(&mut self.context, self.backend.as_ref()) => result,
        };

        match outcome {
            Ok(outcome) => {
                self.session.compression_count += 1;
                let ratio = outcome.ratio();
                info!(
                    "Compression #{}: {} -> {} chars ({:.1}%)",
                    self.session.compression_count,
                    outcome.before_chars,
                    outcome.after_chars,
                    ratio * 100.0
                );
                self.record(
                    outcome.summary,
                    EventDetail::Compress {
                        before_chars: outcome.before_chars,
                        after_chars: outcome.after_chars,
                        ratio: round_to(ratio, 3),
                        compression_number: self.session.compression_count,
                    },
                )
                .await;
                self.commit();
            }
            Err(e) => {
                if !self.cancel.is_cancelled() {
                    warn!(
                        "{}; keeping {} chars until the next check",
                        e,
                        self.context.current_length()
                    );
                }
            }
        }
    }

    /// Write an event to the log and to observers, in turn order.
    async fn record(&mut self, content: String, detail: EventDetail) {
        let event = SessionEvent {
            seq: self.session.next_seq(),
            time: Utc::now(),
            thought: self.session.thought_count,
            content,
            context_chars: self.context.current_length(),
            detail,
        };
        self.log.record(&event).await;
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Publish counters and context for observers.
    fn commit(&self) {
        self.telemetry.commit(
            Committed {
                state: self.telemetry.state(),
                thoughts: self.session.thought_count,
                compressions: self.session.compression_count,
                total_tokens: self.session.total_tokens,
                context_length: self.context.current_length(),
                avg_think_seconds: self.session.avg_think_seconds(),
            },
            self.context.snapshot(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avg_think_seconds() {
        let mut session = Session::new(
            Local::now(),
            "m".to_string(),
            &CognitionConfig::default(),
        );
        assert_eq!(session.avg_think_seconds(), 0.0);

        session.thought_count = 2;
        session.think_time = Duration::from_secs(4);
        assert_eq!(session.avg_think_seconds(), 2.0);
    }

    #[test]
    fn test_event_sequence_is_monotonic() {
        let mut session = Session::new(
            Local::now(),
            "m".to_string(),
            &CognitionConfig::default(),
        );
        assert_eq!(session.next_seq(), 1);
        assert_eq!(session.next_seq(), 2);
    }
}
