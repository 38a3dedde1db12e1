//! User feedback on answers, appended to a JSON-lines log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::QaError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub answer: String,
    pub is_helpful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// Append-only feedback log, one JSON object per line
pub struct FeedbackLog {
    path: PathBuf,
    // Keeps concurrent appends from interleaving
    lock: Mutex<()>,
}

impl FeedbackLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &FeedbackRecord) -> Result<(), QaError> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| QaError::Internal(format!("Failed to encode feedback: {}", e)))?;
        line.push('\n');

        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| QaError::Internal(format!("Failed to create feedback dir: {}", e)))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| QaError::Internal(format!("Failed to open feedback log: {}", e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| QaError::Internal(format!("Failed to write feedback: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| QaError::Internal(format!("Failed to write feedback: {}", e)))?;

        info!(helpful = record.is_helpful, "Feedback received for: {}", record.question);
        Ok(())
    }
}
