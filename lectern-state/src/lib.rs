//! # Lectern State (lectern-state)
//!
//! The shared mutable state behind the Lectern question answering service.
//! Every component owns its own synchronization; callers only go through
//! the public operations below.
//!
//! ## Components
//!
//! - [`AnswerCache`]: TTL-bounded answers keyed by raw question text
//! - [`ContextStore`]: the file-backed context, reloaded when the file
//!   changes and replaced atomically on update
//! - [`MetricsRecorder`]: request counters and a streaming mean latency
//!
//! ## Example
//!
//! ```no_run
//! use lectern_state::{ContextStore, MetricsRecorder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let context = ContextStore::open("context/context.txt").await?;
//!     let metrics = MetricsRecorder::new();
//!
//!     let text = context.get().await;
//!     println!("Context has {} characters", text.chars().count());
//!
//!     metrics.record(true, 0.12).await;
//!     println!("{:?}", metrics.snapshot().await);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod context;
pub mod error;
pub mod metrics;

// Re-export main types for convenience
pub use cache::{AnswerCache, AnswerPayload, CacheConfig, CacheConfigBuilder, CacheStats};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use context::{ContextState, ContextStore};
pub use error::{Result, StateError};
pub use metrics::{MetricsRecorder, MetricsSnapshot};
