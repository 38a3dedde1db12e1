use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lectern_state::{
    AnswerCache, AnswerPayload, CacheStats, ContextStore, MetricsRecorder, MetricsSnapshot,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn, Instrument};

use crate::answerer::{Answerer, AnswererInfo};
use crate::api::auth::AdminAuth;
use crate::error::{AnswererError, QaError, Result};

/// Characters of context shown on each side of an answer
pub const SNIPPET_MARGIN: usize = 20;

/// Serves questions and admin operations over the shared state
///
/// Holds no locks of its own. The cache, the context and the metrics each
/// guard themselves; the only private state here is the purge flag.
pub struct Orchestrator {
    cache: Arc<AnswerCache>,
    context: Arc<ContextStore>,
    metrics: Arc<MetricsRecorder>,
    answerer: Arc<dyn Answerer>,
    auth: AdminAuth,
    config: OrchestratorConfig,
    purge_in_flight: Arc<AtomicBool>,
    purges_started: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Answers scoring below this are refused and never cached
    pub confidence_threshold: f64,
    /// Longest answer the Answerer may extract
    pub max_answer_length: usize,
    /// Upper bound on one Answerer call
    pub answer_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.01,
            max_answer_length: 50,
            answer_timeout: Duration::from_secs(30),
        }
    }
}

/// Which parts of an admin reload succeeded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadReport {
    pub context_reloaded: bool,
    pub model_reloaded: bool,
    pub cache_cleared: bool,
}

/// Health/status summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub answerer: AnswererInfo,
    pub context_size: usize,
    pub cache_ttl_secs: u64,
    pub cache_entries: usize,
    pub cache_stats: CacheStats,
    pub purges_started: u64,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<AnswerCache>,
        context: Arc<ContextStore>,
        metrics: Arc<MetricsRecorder>,
        answerer: Arc<dyn Answerer>,
        auth: AdminAuth,
    ) -> Self {
        Self {
            cache,
            context,
            metrics,
            answerer,
            auth,
            config: OrchestratorConfig::default(),
            purge_in_flight: Arc::new(AtomicBool::new(false)),
            purges_started: AtomicU64::new(0),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Answer a question against the current context
    ///
    /// The question is the cache key exactly as given. Every call records
    /// one metric and schedules a background purge of expired entries.
    pub async fn answer(&self, question: &str) -> Result<AnswerPayload> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("answer", %request_id);

        let started = Instant::now();
        let result = self.answer_inner(question, started).instrument(span).await;

        self.metrics
            .record(result.is_ok(), started.elapsed().as_secs_f64())
            .await;
        self.schedule_purge();

        result
    }

    async fn answer_inner(&self, question: &str, started: Instant) -> Result<AnswerPayload> {
        if let Some(mut cached) = self.cache.get(question).await {
            info!("Answer found in cache for: {}", question);
            cached.response_time = started.elapsed().as_secs_f64();
            return Ok(cached);
        }

        // Read before the context so a clear that races with this request
        // refuses our insert below
        let generation = self.cache.generation().await;

        if !self.answerer.is_available() {
            error!("Question received while the answerer is unavailable");
            return Err(QaError::ServiceUnavailable(
                "answerer is not loaded".to_string(),
            ));
        }

        let context = self.context.get().await;
        info!("Question received: {}", question);

        let span = tokio::time::timeout(
            self.config.answer_timeout,
            self.answerer
                .answer(question, &context, self.config.max_answer_length),
        )
        .await
        .map_err(|_| AnswererError::Timeout(self.config.answer_timeout))
        .and_then(|r| r)
        .map_err(|e| {
            error!("Failed to process question: {}", e);
            QaError::from(e)
        })?;

        if span.score.is_nan() || span.score < self.config.confidence_threshold {
            warn!("Low confidence answer: {:.4}", span.score);
            return Err(QaError::NoConfidentAnswer { score: span.score });
        }

        if !(0.0..=1.0).contains(&span.score) {
            error!("Answerer returned a score outside [0, 1]: {}", span.score);
            return Err(QaError::Internal("answerer returned an invalid score".to_string()));
        }

        let context_len = context.chars().count();
        if span.end < span.start || span.end > context_len {
            error!(
                "Answerer returned an invalid span: start {} end {} (context {} characters)",
                span.start, span.end, context_len
            );
            return Err(QaError::Internal("answerer returned an invalid span".to_string()));
        }

        let payload = AnswerPayload {
            snippet: context_snippet(&context, span.start, span.end),
            answer: span.answer,
            score: span.score,
            start: span.start,
            end: span.end,
            response_time: started.elapsed().as_secs_f64(),
        };

        let stored = self
            .cache
            .put_if_generation(question.to_string(), payload.clone(), generation)
            .await;
        if !stored {
            debug!("Cache was cleared while answering, not caching");
        }

        info!(
            score = payload.score,
            response_time = payload.response_time,
            "Answer found: '{}'",
            payload.answer
        );
        Ok(payload)
    }

    /// Start a purge of expired cache entries unless one is already running
    fn schedule_purge(&self) {
        if self
            .purge_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.purges_started.fetch_add(1, Ordering::Relaxed);

        let cache = self.cache.clone();
        let in_flight = PurgeInFlight(self.purge_in_flight.clone());
        tokio::spawn(async move {
            let _in_flight = in_flight;
            let removed = cache.purge_expired().await;
            if removed > 0 {
                debug!("Background purge removed {} expired entries", removed);
            }
        });
    }

    /// Number of background purges started so far
    pub fn purges_started(&self) -> u64 {
        self.purges_started.load(Ordering::Relaxed)
    }

    pub async fn status(&self) -> ServiceStatus {
        ServiceStatus {
            answerer: self.answerer.info(),
            context_size: self.context.get().await.chars().count(),
            cache_ttl_secs: self.cache.config().ttl.as_secs(),
            cache_entries: self.cache.len().await,
            cache_stats: self.cache.stats().await,
            purges_started: self.purges_started(),
        }
    }

    /// Verify an admin credential and open an admin session
    pub fn admin(&self, credential: Option<&str>) -> Result<AdminSession<'_>> {
        self.auth.verify(credential).inspect_err(|_| {
            warn!("Rejected admin call with invalid or missing API key");
        })?;
        Ok(AdminSession { orchestrator: self })
    }
}

/// Resets the purge flag when the purge task ends, even by panic
struct PurgeInFlight(Arc<AtomicBool>);

impl Drop for PurgeInFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Admin operations, reachable only through a verified credential
pub struct AdminSession<'a> {
    orchestrator: &'a Orchestrator,
}

impl AdminSession<'_> {
    /// Reload the context file and the answerer, then clear the cache
    ///
    /// Fails only if both reloads failed. The cache is cleared either way.
    pub async fn reload(&self) -> Result<ReloadReport> {
        let o = self.orchestrator;

        let context_reloaded = o.context.reload().await.is_ok();
        let model_reloaded = o.answerer.reload().await;
        o.cache.clear().await;

        info!(context_reloaded, model_reloaded, "Admin reload finished");

        if !context_reloaded && !model_reloaded {
            return Err(QaError::ReloadFailed);
        }

        Ok(ReloadReport {
            context_reloaded,
            model_reloaded,
            cache_cleared: true,
        })
    }

    /// Persist and swap the context, then clear the cache
    ///
    /// Returns the new context size in characters.
    pub async fn update_context(&self, text: &str) -> Result<usize> {
        let o = self.orchestrator;

        o.context.update(text).await?;
        o.cache.clear().await;

        Ok(text.chars().count())
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.orchestrator.metrics.snapshot().await
    }

    pub async fn reset_metrics(&self) {
        self.orchestrator.metrics.reset().await;
    }

    pub async fn clear_cache(&self) {
        self.orchestrator.cache.clear().await;
    }
}

/// Excerpt of `context` around the answer span
///
/// The window is `[start - 20, end + 20]` in characters, clamped to the
/// context. A window clipped on either side is wrapped in `...`.
pub fn context_snippet(context: &str, start: usize, end: usize) -> String {
    let len = context.chars().count();
    let from = start.saturating_sub(SNIPPET_MARGIN).min(len);
    let to = end.saturating_add(SNIPPET_MARGIN).min(len).max(from);

    let excerpt: String = context.chars().skip(from).take(to - from).collect();

    if from > 0 || to < len {
        format!("...{}...", excerpt)
    } else {
        excerpt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answerer::AnswerSpan;
    use async_trait::async_trait;
    use lectern_state::CacheConfig;
    use tempfile::TempDir;

    struct FixedAnswerer;

    #[async_trait]
    impl Answerer for FixedAnswerer {
        async fn answer(&self, _: &str, _: &str, _: usize) -> std::result::Result<AnswerSpan, AnswererError> {
            Ok(AnswerSpan {
                answer: "x".to_string(),
                score: 0.9,
                start: 0,
                end: 1,
            })
        }

        async fn reload(&self) -> bool {
            true
        }

        fn is_available(&self) -> bool {
            true
        }

        fn info(&self) -> AnswererInfo {
            AnswererInfo {
                name: "fixed".to_string(),
                endpoint: "memory".to_string(),
                available: true,
                loaded_at: None,
            }
        }
    }

    async fn orchestrator(dir: &TempDir) -> Orchestrator {
        let context = ContextStore::open(dir.path().join("context.txt")).await.unwrap();
        Orchestrator::new(
            Arc::new(AnswerCache::new(CacheConfig::default())),
            Arc::new(context),
            Arc::new(MetricsRecorder::new()),
            Arc::new(FixedAnswerer),
            AdminAuth::new("secret"),
        )
    }

    #[test]
    fn test_snippet_clipped_both_sides() {
        let context = "0123456789".repeat(10);
        let snippet = context_snippet(&context, 40, 45);
        assert_eq!(snippet, format!("...{}...", &context[20..65]));
    }

    #[test]
    fn test_snippet_clipped_on_right_only() {
        let context = "0123456789".repeat(10);
        let snippet = context_snippet(&context, 5, 10);
        assert_eq!(snippet, format!("...{}...", &context[0..30]));
    }

    #[test]
    fn test_snippet_whole_context_is_bare() {
        let context = "Paris is the capital.";
        let snippet = context_snippet(context, 0, 5);
        assert_eq!(snippet, context);
    }

    #[test]
    fn test_snippet_counts_characters_not_bytes() {
        let context = "ñandú ".repeat(10);
        let snippet = context_snippet(&context, 25, 30);
        let expected: String = context.chars().skip(5).take(45).collect();
        assert_eq!(snippet, format!("...{}...", expected));
    }

    #[test]
    fn test_snippet_span_past_end_is_clamped() {
        let context = "short context";
        assert_eq!(context_snippet(context, 100, 120), "......");
    }

    #[tokio::test]
    async fn test_purge_is_single_flight() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir).await;

        // On the current-thread runtime the spawned purge cannot run until
        // this task yields, so every call after the first sees it in flight
        for _ in 0..10 {
            orch.schedule_purge();
        }
        assert_eq!(orch.purges_started(), 1);

        while orch.purge_in_flight.load(Ordering::Acquire) {
            tokio::task::yield_now().await;
        }

        orch.schedule_purge();
        assert_eq!(orch.purges_started(), 2);
    }

    #[tokio::test]
    async fn test_admin_rejects_bad_key() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir).await;

        assert!(matches!(orch.admin(None), Err(QaError::Unauthorized)));
        assert!(matches!(orch.admin(Some("wrong")), Err(QaError::Unauthorized)));
        assert!(orch.admin(Some("secret")).is_ok());
    }
}
