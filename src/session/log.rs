//! Append-only JSON-lines session log

use super::events::SessionEvent;
use crate::Result;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Durable record of every turn, one JSON object per line
#[derive(Debug, Clone)]
pub struct SessionLog {
    path: Option<PathBuf>,
}

impl SessionLog {
    /// Open `{dir}/session_{YYYYmmdd_HHMMSS}.jsonl`, creating `dir` if needed.
    pub async fn create(dir: &Path, born: DateTime<Local>) -> Result<Self> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(format!("session_{}.jsonl", born.format("%Y%m%d_%H%M%S")));
        debug!("Session log: {:?}", path);
        Ok(Self { path: Some(path) })
    }

    /// A log that records nothing
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one record.
    pub async fn append(&self, event: &SessionEvent) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let line = event.to_json_line()?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Append, logging instead of returning failures.
    pub async fn record(&self, event: &SessionEvent) {
        if let Err(e) = self.append(event).await {
            warn!("Failed to write {} event {} to session log: {}", event.kind(), event.seq, e);
        }
    }
}
