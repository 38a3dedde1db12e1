//! The external answer-inference capability
//!
//! The service never runs a model itself. It hands `(question, context)` to
//! an [`Answerer`] and gets back an extracted span with a confidence score.
//! [`HttpAnswerer`] talks to an inference server over HTTP.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::AnswererError;

/// An answer extracted from the context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSpan {
    pub answer: String,
    pub score: f64,
    /// Start position in the context (characters)
    pub start: usize,
    /// End position in the context (characters)
    pub end: usize,
}

/// Description of the backend, for the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswererInfo {
    pub name: String,
    pub endpoint: String,
    pub available: bool,
    pub loaded_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait Answerer: Send + Sync {
    /// Extract an answer to `question` from `context`
    async fn answer(
        &self,
        question: &str,
        context: &str,
        max_answer_len: usize,
    ) -> Result<AnswerSpan, AnswererError>;

    /// Re-establish the backend; returns whether it is available afterwards
    async fn reload(&self) -> bool;

    fn is_available(&self) -> bool;

    fn info(&self) -> AnswererInfo;
}

/// Configuration for the HTTP answerer
#[derive(Debug, Clone)]
pub struct HttpAnswererConfig {
    /// Base URL of the inference server
    pub endpoint: String,
    /// Model the server should use
    pub model: String,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

impl Default for HttpAnswererConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8500".to_string(),
            model: "distilbert-base-uncased-distilled-squad".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Answerer backed by an HTTP inference server
///
/// Expects `POST {endpoint}/answer` to return `{answer, score, start, end}`
/// and `GET {endpoint}/health` to succeed when the model is loaded.
pub struct HttpAnswerer {
    config: HttpAnswererConfig,
    client: reqwest::Client,
    available: AtomicBool,
    /// Milliseconds since the epoch of the last successful load, 0 if never
    loaded_at_ms: AtomicI64,
}

impl HttpAnswerer {
    pub fn new(config: HttpAnswererConfig) -> Result<Self, AnswererError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AnswererError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            available: AtomicBool::new(false),
            loaded_at_ms: AtomicI64::new(0),
        })
    }

    /// Build the answerer and probe the backend once
    pub async fn connect(config: HttpAnswererConfig) -> Result<Self, AnswererError> {
        let answerer = Self::new(config)?;
        if answerer.reload().await {
            info!(
                "Answerer ready: {} at {}",
                answerer.config.model, answerer.config.endpoint
            );
        } else {
            warn!(
                "Answerer not reachable at {}, questions will fail until reloaded",
                answerer.config.endpoint
            );
        }
        Ok(answerer)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Answerer for HttpAnswerer {
    async fn answer(
        &self,
        question: &str,
        context: &str,
        max_answer_len: usize,
    ) -> Result<AnswerSpan, AnswererError> {
        let payload = json!({
            "model": self.config.model,
            "question": question,
            "context": context,
            "max_answer_len": max_answer_len,
            "handle_impossible_answer": true,
        });

        let response = self
            .client
            .post(self.url("answer"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnswererError::Timeout(self.config.request_timeout)
                } else if e.is_connect() {
                    AnswererError::Unavailable(e.to_string())
                } else {
                    AnswererError::Inference(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            let text = response.text().await.unwrap_or_default();
            return Err(AnswererError::Unavailable(text));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AnswererError::Inference(format!("{}: {}", status, text)));
        }

        response
            .json::<AnswerSpan>()
            .await
            .map_err(|e| AnswererError::Inference(format!("Unreadable answer body: {}", e)))
    }

    async fn reload(&self) -> bool {
        let healthy = match self.client.get(self.url("health")).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Answerer health check returned {}", response.status());
                false
            }
            Err(e) => {
                warn!("Answerer health check failed: {}", e);
                false
            }
        };

        if healthy {
            self.loaded_at_ms
                .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
        }
        self.available.store(healthy, Ordering::SeqCst);
        healthy
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn info(&self) -> AnswererInfo {
        let loaded_at = match self.loaded_at_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        };

        AnswererInfo {
            name: self.config.model.clone(),
            endpoint: self.config.endpoint.clone(),
            available: self.is_available(),
            loaded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let answerer = HttpAnswerer::new(HttpAnswererConfig {
            endpoint: "http://localhost:8500/".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(answerer.url("answer"), "http://localhost:8500/answer");
    }

    #[test]
    fn test_new_answerer_is_unavailable_until_loaded() {
        let answerer = HttpAnswerer::new(HttpAnswererConfig::default()).unwrap();

        assert!(!answerer.is_available());
        let info = answerer.info();
        assert!(info.loaded_at.is_none());
        assert_eq!(info.name, "distilbert-base-uncased-distilled-squad");
    }

    #[tokio::test]
    async fn test_reload_against_closed_port_reports_unavailable() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let answerer = HttpAnswerer::new(HttpAnswererConfig {
            endpoint: format!("http://127.0.0.1:{}", port),
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();

        assert!(!answerer.reload().await);
        assert!(!answerer.is_available());

        let err = answerer.answer("q?", "some context", 50).await.unwrap_err();
        assert!(matches!(err, AnswererError::Unavailable(_)));
    }
}
