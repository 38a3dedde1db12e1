//! # Answer Cache
//!
//! A TTL-bounded mapping from raw question text to a previously computed
//! answer.
//!
//! ## Features
//!
//! - **Exact TTL**: an entry is visible only while `now - stored_at < ttl`
//! - **Lazy eviction**: expired entries are dropped when read
//! - **Purge**: a full pass removes every expired entry and nothing else
//! - **Clear generations**: inserts computed before a clear can be refused
//!
//! ## Example
//!
//! ```rust
//! use lectern_state::cache::{AnswerCache, AnswerPayload, CacheConfig};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let config = CacheConfig::builder()
//!     .ttl(Duration::from_secs(3600)) // 1 hour
//!     .build();
//!
//! let cache = AnswerCache::new(config);
//!
//! let payload = AnswerPayload {
//!     answer: "Paris".to_string(),
//!     score: 0.93,
//!     start: 27,
//!     end: 32,
//!     snippet: "...capital of France is Paris.".to_string(),
//!     response_time: 0.2,
//! };
//! cache.put("What is the capital of France?".to_string(), payload).await;
//!
//! if let Some(hit) = cache.get("What is the capital of France?").await {
//!     println!("Cache hit: {}", hit.answer);
//! }
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod store;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::CacheEntry;
pub use store::{start_auto_purge, AnswerCache};
pub use types::{AnswerPayload, CacheKey, CacheStats};
