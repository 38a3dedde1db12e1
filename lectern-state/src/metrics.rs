//! Request metrics with a streaming mean latency

use crate::clock::{SharedClock, SystemClock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

/// Point-in-time copy of the request counters
///
/// `successful + failed == total` holds for every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(rename = "total_requests")]
    pub total: u64,

    #[serde(rename = "successful_requests")]
    pub successful: u64,

    #[serde(rename = "failed_requests")]
    pub failed: u64,

    /// Mean latency in seconds
    #[serde(rename = "avg_response_time")]
    pub avg_latency: f64,

    pub since_reset_at: DateTime<Utc>,

    /// Seconds between the last reset and this snapshot
    pub uptime_since_reset: f64,
}

#[derive(Debug)]
struct Counters {
    total: u64,
    successful: u64,
    failed: u64,
    avg_latency: f64,
    since_reset_at: DateTime<Utc>,
}

impl Counters {
    fn zeroed(at: DateTime<Utc>) -> Self {
        Self {
            total: 0,
            successful: 0,
            failed: 0,
            avg_latency: 0.0,
            since_reset_at: at,
        }
    }
}

/// Concurrently updated request counters
///
/// All four counters live behind one lock and change together, so no
/// snapshot can observe a half-applied `record`.
pub struct MetricsRecorder {
    clock: SharedClock,
    counters: Mutex<Counters>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        let now = clock.now();
        Self {
            clock,
            counters: Mutex::new(Counters::zeroed(now)),
        }
    }

    /// Record one finished request
    ///
    /// The mean is updated incrementally: `mean += (x - mean) / total`.
    pub async fn record(&self, success: bool, latency_secs: f64) {
        let latency = if latency_secs.is_finite() {
            latency_secs.max(0.0)
        } else {
            0.0
        };

        let mut counters = self.counters.lock().await;
        counters.total += 1;
        if success {
            counters.successful += 1;
        } else {
            counters.failed += 1;
        }
        counters.avg_latency += (latency - counters.avg_latency) / counters.total as f64;
    }

    /// Zero all counters and restart the reset clock
    pub async fn reset(&self) {
        let now = self.clock.now();
        let mut counters = self.counters.lock().await;
        *counters = Counters::zeroed(now);
        info!("Metrics reset");
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let now = self.clock.now();
        let counters = self.counters.lock().await;

        let uptime = (now - counters.since_reset_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        MetricsSnapshot {
            total: counters.total,
            successful: counters.successful,
            failed: counters.failed,
            avg_latency: counters.avg_latency,
            since_reset_at: counters.since_reset_at,
            uptime_since_reset: uptime,
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
