//! Interactive operator shell
//!
//! Plain lines are interjections; slash commands inspect the session.
//! Events from the loop are printed as they are committed.

use crate::session::{CognitionSession, EventDetail, LoopState, SessionEvent, StatusSnapshot};
use crossterm::style::Stylize;
use std::io::{self, BufRead};
use std::path::Path;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::warn;

/// Characters shown by `/context`
pub const CONTEXT_PREVIEW_CHARS: usize = 500;

/// A parsed shell line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Status,
    Context,
    Stats,
    Quit,
    Empty,
}

pub fn parse_command(line: &str) -> Command {
    match line.trim() {
        "" => Command::Empty,
        "/status" => Command::Status,
        "/context" => Command::Context,
        "/stats" => Command::Stats,
        "/quit" | "/exit" => Command::Quit,
        text => Command::Say(text.to_string()),
    }
}

pub fn banner() -> String {
    let rule = "─".repeat(60);
    format!(
        "{rule}\nPersistent Cognition - Interactive Shell\n  \
         <text>     speak to the stream of thought\n  \
         /status    one-line status\n  \
         /context   tail of the current context\n  \
         /stats     detailed statistics\n  \
         /quit      stop\n{rule}"
    )
}

pub fn format_status_line(s: &StatusSnapshot) -> String {
    let activity = if s.state.is_busy() {
        format!("busy ({})", s.state)
    } else {
        s.state.to_string()
    };
    format!(
        "up {} | thoughts {} | compressions {} | ctx {}c | {} | {}",
        s.uptime_label(),
        s.thoughts,
        s.compressions,
        s.context_length,
        s.mode,
        activity
    )
}

pub fn format_stats(s: &StatusSnapshot) -> String {
    let rows = [
        ("model", s.model.clone()),
        ("uptime", s.uptime_label()),
        ("thoughts", s.thoughts.to_string()),
        ("compressions", s.compressions.to_string()),
        ("context", format!("{} chars", s.context_length)),
        ("generated", format!("{} tokens", s.total_tokens)),
        ("avg think", format!("{:.1}s", s.avg_think_seconds)),
        ("mode", s.mode.clone()),
        ("state", s.state.to_string()),
    ];
    let mut out = String::from("┌─ Persistent Cognition Stats ──────────\n");
    for (label, value) in rows {
        out.push_str(&format!("│ {:<13} {}\n", format!("{label}:"), value));
    }
    out.push_str("└───────────────────────────────────────");
    out
}

/// Summary printed when the session ends
pub fn format_farewell(s: &StatusSnapshot, log_path: Option<&Path>) -> String {
    let mut out = format!(
        "Stopped.\n  uptime:        {}\n  thoughts:      {}\n  compressions:  {}\n  tokens:        {}\n",
        s.uptime_label(),
        s.thoughts,
        s.compressions,
        s.total_tokens
    );
    if s.thoughts > 0 {
        out.push_str(&format!("  avg think:     {:.1}s\n", s.avg_think_seconds));
    }
    if let Some(path) = log_path {
        out.push_str(&format!("  log:           {}\n", path.display()));
    }
    out
}

/// Header line for an event
pub fn format_event_header(event: &SessionEvent) -> String {
    let time = event.time.with_timezone(&chrono::Local).format("%H:%M:%S");
    match &event.detail {
        EventDetail::Thought {
            duration_sec,
            tokens_per_sec,
            ..
        } => format!(
            "[thought #{} - {} | {:.1}s | {:.0} tok/s | ctx:{}c]",
            event.thought, time, duration_sec, tokens_per_sec, event.context_chars
        ),
        EventDetail::Compress {
            before_chars,
            after_chars,
            ratio,
            compression_number,
        } => format!(
            "[compression #{} | {} chars -> {} chars | ratio {:.1}%]",
            compression_number,
            before_chars,
            after_chars,
            ratio * 100.0
        ),
        EventDetail::Dialog { .. } => format!("[dialog - {} | ctx:{}c]", time, event.context_chars),
    }
}

fn print_event(event: &SessionEvent) {
    let header = format_event_header(event);
    match event.detail {
        EventDetail::Thought { .. } => {
            println!("\n{}", header.as_str().dim());
            println!("{}", event.content.as_str().cyan());
        }
        EventDetail::Compress { .. } => println!("\n{}", header.as_str().yellow()),
        // The reply itself is printed by the shell that asked for it.
        EventDetail::Dialog { .. } => println!("{}", header.as_str().dim()),
    }
}

/// Print events until the session's event stream closes.
pub fn spawn_event_printer(mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Console fell behind, {} events not shown", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Read stdin on a blocking thread and forward lines.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Run the shell until `/quit`, end of input, or the session stops.
pub async fn run_shell(session: &CognitionSession) {
    println!("\n{}\n", banner());
    let mut lines = spawn_stdin_reader();
    let stop = session.stop_token();

    loop {
        let line = tokio::select! {
            _ = stop.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        match parse_command(&line) {
            Command::Empty => {}
            Command::Status => println!("  {}", format_status_line(&session.status())),
            Command::Context => {
                let tail = format!("...{}", session.context_tail(CONTEXT_PREVIEW_CHARS));
                println!("{}", tail.as_str().dim());
            }
            Command::Stats => println!("{}", format_stats(&session.status())),
            Command::Quit => break,
            Command::Say(message) => {
                if session.state() != LoopState::Idle {
                    println!("  {}", "(waiting for the current turn to finish...)".dim());
                }
                let reply = session.submit(message).await.to_string();
                println!("{}", reply.as_str().blue());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use std::time::Duration;

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            uptime: Duration::from_secs(65),
            thoughts: 12,
            compressions: 2,
            context_length: 3456,
            total_tokens: 2900,
            avg_think_seconds: 3.21,
            state: LoopState::Thinking,
            mode: "continuous".to_string(),
            model: "local-model".to_string(),
            born_at: Local::now(),
        }
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("  /status "), Command::Status);
        assert_eq!(parse_command("/quit"), Command::Quit);
        assert_eq!(parse_command(""), Command::Empty);
        assert_eq!(parse_command("hello there"), Command::Say("hello there".to_string()));
        assert_eq!(parse_command("/unknown"), Command::Say("/unknown".to_string()));
    }

    #[test]
    fn test_status_line() {
        let line = format_status_line(&snapshot());
        assert!(line.contains("up 0:01:05"));
        assert!(line.contains("thoughts 12"));
        assert!(line.contains("ctx 3456c"));
        assert!(line.contains("busy (thinking)"));
    }

    #[test]
    fn test_stats_box() {
        let stats = format_stats(&snapshot());
        assert!(stats.contains("local-model"));
        assert!(stats.contains("3.2s"));
        assert!(stats.contains("2900 tokens"));
    }

    #[test]
    fn test_farewell_mentions_log() {
        let text = format_farewell(&snapshot(), Some(Path::new("/tmp/session.jsonl")));
        assert!(text.contains("thoughts:      12"));
        assert!(text.contains("/tmp/session.jsonl"));
    }

    #[test]
    fn test_compress_header() {
        let event = SessionEvent {
            seq: 4,
            time: chrono::Utc::now(),
            thought: 3,
            content: "core".to_string(),
            context_chars: 120,
            detail: EventDetail::Compress {
                before_chars: 5100,
                after_chars: 120,
                ratio: 0.024,
                compression_number: 1,
            },
        };
        assert_eq!(
            format_event_header(&event),
            "[compression #1 | 5100 chars -> 120 chars | ratio 2.4%]"
        );
    }
}
