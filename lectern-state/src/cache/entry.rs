//! Cache entry with its storage timestamp

use crate::cache::types::{AnswerPayload, CacheKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached answer and the moment it was stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The raw question text
    pub key: CacheKey,

    /// The cached answer
    pub payload: AnswerPayload,

    /// When the entry was stored
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, payload: AnswerPayload, stored_at: DateTime<Utc>) -> Self {
        Self {
            key,
            payload,
            stored_at,
        }
    }

    /// Age of the entry at `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.stored_at
    }

    /// An entry is expired once its age reaches the TTL
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.age(now) >= ttl
    }
}
