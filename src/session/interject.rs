//! Human interjections
//!
//! A single-slot handoff between external callers and the loop actor. A caller
//! parks a message in the slot and waits on a oneshot for the reply; the loop
//! takes the message at its next turn boundary and answers through the
//! oneshot. Submissions are serialized by an async gate so at most one message
//! is ever pending.

use crate::{CognitionError, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shown to the operator when no reply arrived
pub const NO_RESPONSE: &str = "(no response)";

/// What a submitter gets back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The loop answered (possibly with an empty string)
    Spoken(String),
    /// Timed out, stopped, or the dialog turn failed
    NoResponse,
}

impl Reply {
    pub fn text(&self) -> Option<&str> {
        match self {
            Reply::Spoken(text) => Some(text),
            Reply::NoResponse => None,
        }
    }

    pub fn is_spoken(&self) -> bool {
        matches!(self, Reply::Spoken(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Spoken(text) => write!(f, "{}", text),
            Reply::NoResponse => write!(f, "{}", NO_RESPONSE),
        }
    }
}

impl From<Result<String>> for Reply {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(text) => Reply::Spoken(text),
            Err(_) => Reply::NoResponse,
        }
    }
}

/// A pending human message, owned by the loop once taken
#[derive(Debug)]
pub struct Interjection {
    id: u64,
    message: String,
    reply_tx: oneshot::Sender<String>,
}

impl Interjection {
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Deliver the reply. Returns false if the submitter already gave up.
    pub fn respond(self, reply: String) -> bool {
        self.reply_tx.send(reply).is_ok()
    }
}

/// Single-slot, blocking handoff between submitters and the loop
#[derive(Debug)]
pub struct InterjectionChannel {
    slot: Mutex<Option<Interjection>>,
    arrived: Notify,
    gate: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
    cancel: CancellationToken,
}

impl InterjectionChannel {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            slot: Mutex::new(None),
            arrived: Notify::new(),
            gate: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(0),
            cancel,
        }
    }

    /// Submit a message and wait for the loop's reply.
    ///
    /// Never waits longer than `timeout`, including time spent queued behind
    /// another submitter.
    pub async fn submit(&self, message: impl Into<String>, timeout: Duration) -> Result<String> {
        if self.cancel.is_cancelled() {
            return Err(CognitionError::SessionStopped);
        }

        let deadline = Instant::now() + timeout;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = message.into();

        let exchange = async {
            let _turn = self.gate.lock().await;
            let (reply_tx, reply_rx) = oneshot::channel();
            self.put(Interjection {
                id,
                message,
                reply_tx,
            });
            self.arrived.notify_one();
            reply_rx.await
        };

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CognitionError::SessionStopped),
            result = tokio::time::timeout_at(deadline, exchange) => match result {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(_)) if self.cancel.is_cancelled() => Err(CognitionError::SessionStopped),
                Ok(Err(_)) => Err(CognitionError::BackendRequest(
                    "dialog turn produced no reply".to_string(),
                )),
                Err(_) => Err(CognitionError::InterjectionTimeout(timeout)),
            },
        };

        if outcome.is_err() {
            self.withdraw(id);
        }
        outcome
    }

    fn put(&self, interjection: Interjection) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(stale) = slot.replace(interjection) {
            warn!("Replacing unconsumed interjection {}", stale.id);
        }
    }

    /// Remove our own message if the loop has not taken it yet.
    fn withdraw(&self, id: u64) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|pending| pending.id == id) {
            debug!("Withdrawing interjection {}", id);
            slot.take();
        }
    }

    /// Take the pending message, clearing the slot.
    ///
    /// Messages whose submitter already gave up are discarded.
    pub fn take(&self) -> Option<Interjection> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        let pending = slot.take()?;
        if pending.reply_tx.is_closed() {
            debug!("Dropping abandoned interjection {}", pending.id);
            return None;
        }
        Some(pending)
    }

    pub fn has_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Wait up to `duration`, returning early on a new interjection or stop.
    pub async fn wait(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self.has_pending() || self.cancel.is_cancelled() {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                _ = self.cancel.cancelled() => return,
                // A stored permit can be stale; the slot check above decides.
                _ = self.arrived.notified() => continue,
            }
        }
    }

    /// Drop anything pending so its submitter is released.
    pub fn close(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.take().is_some() {
            debug!("Discarded pending interjection on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn channel() -> (Arc<InterjectionChannel>, CancellationToken) {
        let cancel = CancellationToken::new();
        (Arc::new(InterjectionChannel::new(cancel.clone())), cancel)
    }

    #[tokio::test]
    async fn test_submit_and_respond() {
        let (channel, _cancel) = channel();
        let loop_side = channel.clone();

        let responder = tokio::spawn(async move {
            loop {
                if let Some(interjection) = loop_side.take() {
                    let reply = format!("echo: {}", interjection.message());
                    assert!(interjection.respond(reply));
                    break;
                }
                loop_side.wait(Duration::from_millis(50)).await;
            }
        });

        let reply = channel.submit("hello", Duration::from_secs(5)).await.unwrap();
        assert_eq!(reply, "echo: hello");
        responder.await.unwrap();
        assert!(!channel.has_pending());
    }

    #[tokio::test]
    async fn test_timeout_withdraws_message() {
        let (channel, _cancel) = channel();
        let err = channel
            .submit("anyone?", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, CognitionError::InterjectionTimeout(_)));
        assert!(channel.take().is_none());
    }

    #[tokio::test]
    async fn test_stop_releases_submitter() {
        let (channel, cancel) = channel();
        let submitter = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.submit("hi", Duration::from_secs(60)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = submitter.await.unwrap();
        assert!(matches!(result, Err(CognitionError::SessionStopped)));
        assert!(matches!(
            channel.submit("late", Duration::from_secs(1)).await,
            Err(CognitionError::SessionStopped)
        ));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_interjection() {
        let (channel, _cancel) = channel();
        let submitter = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.submit("wake", Duration::from_secs(5)).await })
        };

        let started = Instant::now();
        channel.wait(Duration::from_secs(30)).await;
        assert!(started.elapsed() < Duration::from_secs(5));

        let interjection = channel.take().unwrap();
        interjection.respond("up".to_string());
        assert_eq!(submitter.await.unwrap().unwrap(), "up");
    }

    #[tokio::test]
    async fn test_wait_wakes_on_stop() {
        let (channel, cancel) = channel();
        let waiter = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.wait(Duration::from_secs(30)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait should end on stop")
            .unwrap();
    }

    #[test]
    fn test_reply_sentinel_is_distinct_from_empty() {
        assert_ne!(Reply::Spoken(String::new()), Reply::NoResponse);
        assert_eq!(Reply::NoResponse.to_string(), NO_RESPONSE);
        assert_eq!(Reply::Spoken(String::new()).text(), Some(""));
        assert_eq!(Reply::from(Err(CognitionError::SessionStopped)), Reply::NoResponse);
    }
}
