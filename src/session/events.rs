//! Session event records
//!
//! One immutable record per think, compress or dialog turn. Records are
//! written to the session log and broadcast to observers; the loop never
//! reads them back.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Kind-specific metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "meta", rename_all = "snake_case")]
pub enum EventDetail {
    Thought {
        duration_sec: f64,
        tokens_generated: u64,
        tokens_per_sec: f64,
    },
    Compress {
        before_chars: usize,
        after_chars: usize,
        ratio: f64,
        compression_number: u64,
    },
    Dialog {
        human: String,
    },
}

/// A finalized turn record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEvent {
    /// Position in the session's event order, starting at 1
    pub seq: u64,
    pub time: DateTime<Utc>,
    /// Thought count when the event was recorded
    pub thought: u64,
    /// Generated text: the thought, the summary, or the reply
    pub content: String,
    /// Context length right after the turn
    pub context_chars: usize,
    #[serde(flatten)]
    pub detail: EventDetail,
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self.detail {
            EventDetail::Thought { .. } => "thought",
            EventDetail::Compress { .. } => "compress",
            EventDetail::Dialog { .. } => "dialog",
        }
    }

    /// One JSON object, no trailing newline
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Round to `places` decimals for log readability
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn thought_event() -> SessionEvent {
        SessionEvent {
            seq: 1,
            time: Utc::now(),
            thought: 1,
            content: "a thought".to_string(),
            context_chars: 42,
            detail: EventDetail::Thought {
                duration_sec: 1.25,
                tokens_generated: 10,
                tokens_per_sec: 8.0,
            },
        }
    }

    #[test]
    fn test_json_line_shape() {
        let line = thought_event().to_json_line().unwrap();
        assert!(!line.contains('\n'));

        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["kind"], "thought");
        assert_eq!(value["thought"], 1);
        assert_eq!(value["context_chars"], 42);
        assert_eq!(value["meta"]["tokens_generated"], 10);
    }

    #[test]
    fn test_dialog_meta_carries_human_message() {
        let event = SessionEvent {
            detail: EventDetail::Dialog {
                human: "hello".to_string(),
            },
            ..thought_event()
        };
        assert_eq!(event.kind(), "dialog");
        let value: Value = serde_json::from_str(&event.to_json_line().unwrap()).unwrap();
        assert_eq!(value["meta"]["human"], "hello");
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(0.05, 1), 0.1);
    }
}
