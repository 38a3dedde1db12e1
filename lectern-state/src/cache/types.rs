//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type: the raw question text, never normalized or hashed
pub type CacheKey = String;

/// A computed answer, as served to callers and stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    /// Extracted answer text
    pub answer: String,

    /// Confidence score in [0, 1]
    pub score: f64,

    /// Start position of the answer in the context (characters)
    pub start: usize,

    /// End position of the answer in the context (characters)
    pub end: usize,

    /// Context excerpt around the answer for display
    #[serde(rename = "context_snippet")]
    pub snippet: String,

    /// Time spent serving the request, in seconds
    pub response_time: f64,
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Lookups that returned a payload
    pub hits: u64,

    /// Lookups that found nothing or an expired entry
    pub misses: u64,

    /// Entries removed because their TTL had passed
    pub expirations: u64,

    /// Number of `clear()` calls
    pub clears: u64,

    /// Inserts refused because a clear happened after the caller's lookup
    pub stale_puts: u64,

    /// Number of entries currently in cache
    pub entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}, expirations: {}, clears: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.expirations,
            self.clears
        )
    }
}
