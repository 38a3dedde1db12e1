//! File-backed shared context
//!
//! [`ContextStore`] owns the one live [`ContextState`] of the process. The
//! state is never mutated in place: every reload or update builds a new
//! state and swaps the pointer under the write lock, so readers see either
//! the old text or the new one and nothing in between.
//!
//! Writers (`reload`, `update`) are serialized by their own mutex and do
//! their file I/O before touching the read-write lock. Readers are only
//! blocked for the duration of the pointer swap.

use crate::clock::{SharedClock, SystemClock};
use crate::error::{Result, StateError};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Content shorter than this many characters is replaced by a sentinel
pub const MIN_CONTEXT_CHARS: usize = 10;

/// Served when the backing file did not exist at startup
pub const CONTEXT_UNAVAILABLE: &str = "Context is not available.";

/// Served when the backing file holds too little text
pub const CONTEXT_INSUFFICIENT: &str = "Context is insufficient.";

/// Served when the backing file existed at startup but could not be read
pub const CONTEXT_LOAD_FAILED: &str = "Context could not be loaded.";

/// One immutable version of the shared context
#[derive(Debug, Clone)]
pub struct ContextState {
    /// The context text served to readers
    pub text: String,

    /// Backing file
    pub source_path: PathBuf,

    /// When this version was installed
    pub loaded_at: DateTime<Utc>,

    /// Modification time of the backing file when this version was read
    pub source_modified: Option<SystemTime>,

    /// Incremented on every swap
    pub revision: u64,
}

/// Shared, file-backed context text
pub struct ContextStore {
    path: PathBuf,
    clock: SharedClock,
    state: RwLock<Arc<ContextState>>,
    writer: Mutex<()>,
    /// Modification time of the last file version that failed to read
    failed_modified: Mutex<Option<SystemTime>>,
}

impl ContextStore {
    /// Open the store on the system clock
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_clock(path, SystemClock::shared()).await
    }

    /// Open the store, creating the parent directory if needed
    ///
    /// A missing or unreadable file is not an error here: the store starts
    /// with a sentinel text and picks the file up once it appears.
    pub async fn open_with_clock(path: impl Into<PathBuf>, clock: SharedClock) -> Result<Self> {
        let path = path.into();
        if path.file_name().is_none() {
            return Err(StateError::Config(format!(
                "context path has no file name: {}",
                path.display()
            )));
        }

        ensure_parent_dir(&path).await?;

        let (text, source_modified) = match read_source(&path).await {
            Ok((text, modified)) => (usable_text(text), modified),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!("Context file not found: {}", path.display());
                (CONTEXT_UNAVAILABLE.to_string(), None)
            }
            Err(e) => {
                error!("Failed to load context from {}: {}", path.display(), e);
                (CONTEXT_LOAD_FAILED.to_string(), None)
            }
        };

        info!("Context loaded: {} characters", text.chars().count());

        let state = ContextState {
            text,
            source_path: path.clone(),
            loaded_at: clock.now(),
            source_modified,
            revision: 0,
        };

        Ok(Self {
            path,
            clock,
            state: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
            failed_modified: Mutex::new(None),
        })
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current context text
    ///
    /// If the backing file was modified after the current version was read,
    /// the file is read again and swapped in first. Any failure along the
    /// way returns the text already in memory, and a file version that
    /// failed to read is not read again until its mtime changes.
    pub async fn get(&self) -> String {
        let current = self.snapshot().await;

        let modified = match tokio::fs::metadata(&self.path)
            .await
            .and_then(|meta| meta.modified())
        {
            Ok(modified) => modified,
            Err(e) => {
                debug!("Cannot stat context file {}: {}", self.path.display(), e);
                return current.text.clone();
            }
        };

        if !is_newer(Some(modified), current.source_modified) {
            return current.text.clone();
        }

        // A version that already failed is retried only once the file changes again
        if *self.failed_modified.lock().await == Some(modified) {
            return current.text.clone();
        }

        info!("Detected change in context file, reloading");

        match read_source(&self.path).await {
            Ok((text, source_modified)) => {
                let state = self.swap_if_newer(usable_text(text), source_modified).await;
                state.text.clone()
            }
            Err(e) => {
                warn!(
                    "Failed to re-read context file {}, keeping current text: {}",
                    self.path.display(),
                    e
                );
                *self.failed_modified.lock().await = Some(modified);
                current.text.clone()
            }
        }
    }

    /// Current state, without checking the backing file
    pub async fn snapshot(&self) -> Arc<ContextState> {
        self.state.read().await.clone()
    }

    /// Re-read the backing file regardless of its modification time
    ///
    /// On failure the current state is left untouched. Content that is too
    /// short is replaced by [`CONTEXT_INSUFFICIENT`] and still counts as a
    /// successful reload.
    pub async fn reload(&self) -> Result<()> {
        let _writer = self.writer.lock().await;

        let (text, source_modified) = read_source(&self.path).await.map_err(|e| {
            error!("Failed to reload context from {}: {}", self.path.display(), e);
            StateError::read(&self.path, e)
        })?;

        let state = self.replace(usable_text(text), source_modified).await;
        info!(
            revision = state.revision,
            "Context reloaded: {} characters",
            state.text.chars().count()
        );
        Ok(())
    }

    /// Persist new text and swap it in
    ///
    /// The file is written to a temporary sibling, flushed and renamed over
    /// the backing file. The in-memory state only changes once the rename
    /// has succeeded.
    pub async fn update(&self, new_text: &str) -> Result<()> {
        let _writer = self.writer.lock().await;

        ensure_parent_dir(&self.path).await?;

        let tmp = temp_path(&self.path);
        if let Err(e) = write_synced(&tmp, new_text).await {
            error!("Failed to write context to {}: {}", tmp.display(), e);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StateError::write(&tmp, e));
        }

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            error!("Failed to replace context file {}: {}", self.path.display(), e);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StateError::write(&self.path, e));
        }

        let source_modified = tokio::fs::metadata(&self.path)
            .await
            .and_then(|meta| meta.modified())
            .ok();

        let state = self.replace(new_text.to_string(), source_modified).await;
        info!(
            revision = state.revision,
            "Context updated: {} characters",
            state.text.chars().count()
        );
        Ok(())
    }

    /// Install a new state unconditionally
    async fn replace(&self, text: String, source_modified: Option<SystemTime>) -> Arc<ContextState> {
        let mut guard = self.state.write().await;
        let next = Arc::new(self.next_state(&guard, text, source_modified));
        *guard = next.clone();
        next
    }

    /// Install a new state only if it was read from a newer file version
    /// than the one currently installed
    async fn swap_if_newer(
        &self,
        text: String,
        source_modified: Option<SystemTime>,
    ) -> Arc<ContextState> {
        let mut guard = self.state.write().await;
        if !is_newer(source_modified, guard.source_modified) {
            debug!("Context already refreshed by another reader");
            return guard.clone();
        }

        let next = Arc::new(self.next_state(&guard, text, source_modified));
        *guard = next.clone();
        info!(
            revision = next.revision,
            "Context reloaded after file change: {} characters",
            next.text.chars().count()
        );
        next
    }

    fn next_state(
        &self,
        current: &ContextState,
        text: String,
        source_modified: Option<SystemTime>,
    ) -> ContextState {
        ContextState {
            text,
            source_path: self.path.clone(),
            loaded_at: self.clock.now(),
            source_modified,
            revision: current.revision + 1,
        }
    }
}

fn is_newer(candidate: Option<SystemTime>, recorded: Option<SystemTime>) -> bool {
    match (candidate, recorded) {
        (Some(candidate), Some(recorded)) => candidate > recorded,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

fn usable_text(text: String) -> String {
    let chars = text.chars().count();
    if chars < MIN_CONTEXT_CHARS {
        warn!("Context too short or empty: {} characters", chars);
        CONTEXT_INSUFFICIENT.to_string()
    } else {
        text
    }
}

/// Read the backing file along with the modification time observed before
/// the read. If the file changes during the read, the recorded time is the
/// older one and the next `get` reads it again.
async fn read_source(path: &Path) -> std::io::Result<(String, Option<SystemTime>)> {
    let modified = tokio::fs::metadata(path).await?.modified().ok();
    let text = tokio::fs::read_to_string(path).await?;
    Ok((text, modified))
}

async fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            if !tokio::fs::try_exists(parent).await.unwrap_or(false) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StateError::write(parent, e))?;
                info!("Created context directory {}", parent.display());
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

async fn write_synced(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}
