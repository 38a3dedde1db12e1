//! HTTP handlers for the question answering service

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use lectern_state::{AnswerPayload, CacheStats, MetricsSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::answerer::AnswererInfo;
use crate::error::QaError;
use crate::feedback::{FeedbackLog, FeedbackRecord};
use crate::orchestrator::{Orchestrator, ReloadReport};

use super::auth::AdminAuth;

pub const MIN_QUESTION_CHARS: usize = 2;
pub const MAX_QUESTION_CHARS: usize = 500;
pub const MIN_CONTEXT_CHARS: usize = 10;

/// Application state
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub feedback: Arc<FeedbackLog>,
    pub cors_enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuestionRequest {
    pub question: String,
}

impl QuestionRequest {
    /// The trimmed question, if it passes validation
    ///
    /// Length bounds apply to the question as sent; the trimmed question
    /// must not be empty.
    pub fn validate(&self) -> Result<&str, QaError> {
        let len = self.question.chars().count();
        if !(MIN_QUESTION_CHARS..=MAX_QUESTION_CHARS).contains(&len) {
            return Err(QaError::InvalidRequest(format!(
                "Question must be between {} and {} characters",
                MIN_QUESTION_CHARS, MAX_QUESTION_CHARS
            )));
        }

        let question = self.question.trim();
        if question.is_empty() {
            return Err(QaError::InvalidRequest(
                "Question cannot be empty or contain only whitespace".to_string(),
            ));
        }
        if !question.contains('?') {
            warn!("Question has no question mark: {}", question);
        }
        Ok(question)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedbackRequest {
    pub question: String,
    pub answer: String,
    pub is_helpful: bool,
    #[serde(default)]
    pub comments: Option<String>,
}

impl FeedbackRequest {
    fn validate(&self) -> Result<(), QaError> {
        if self.question.chars().count() < MIN_QUESTION_CHARS {
            return Err(QaError::InvalidRequest(format!(
                "Question must be at least {} characters",
                MIN_QUESTION_CHARS
            )));
        }
        if self.answer.is_empty() {
            return Err(QaError::InvalidRequest("Answer cannot be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextRequest {
    pub context: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub model: AnswererInfo,
    pub context_size: usize,
    pub cors_enabled: bool,
    /// Cache TTL in seconds
    pub cache_timeout: u64,
    pub cache_entries: usize,
    pub cache_stats: CacheStats,
    /// Percentage of cache lookups that hit
    pub cache_hit_rate: f64,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    #[serde(flatten)]
    pub report: ReloadReport,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ContextResponse {
    pub status: &'static str,
    pub message: String,
    pub context_size: usize,
    pub cache_cleared: bool,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for QaError {
    fn into_response(self) -> Response {
        let status = match &self {
            QaError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            QaError::NoConfidentAnswer { .. } => StatusCode::NOT_FOUND,
            QaError::Unauthorized => StatusCode::UNAUTHORIZED,
            QaError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            QaError::Persistence(_) | QaError::ReloadFailed | QaError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let detail = match &self {
            QaError::Internal(message) => {
                error!("Internal error: {}", message);
                "Internal server error".to_string()
            }
            QaError::Persistence(e) => {
                error!("Persistence failure: {}", e);
                self.to_string()
            }
            _ => self.to_string(),
        };

        let mut response = (status, Json(ErrorBody { detail })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("ApiKey"));
        }
        response
    }
}

fn invalid_body(rejection: JsonRejection) -> QaError {
    QaError::InvalidRequest(rejection.body_text())
}

/// Health/status endpoint
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.orchestrator.status().await;

    Json(StatusResponse {
        status: if status.answerer.available { "ok" } else { "error" },
        model: status.answerer,
        context_size: status.context_size,
        cors_enabled: state.cors_enabled,
        cache_timeout: status.cache_ttl_secs,
        cache_entries: status.cache_entries,
        cache_hit_rate: status.cache_stats.hit_rate(),
        cache_stats: status.cache_stats,
    })
}

/// Answer a question
pub async fn ask(
    State(state): State<Arc<AppState>>,
    body: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<AnswerPayload>, QaError> {
    let Json(request) = body.map_err(invalid_body)?;
    let question = request.validate()?.to_string();

    // Detached, so a dropped connection cannot cancel it midway
    let orchestrator = state.orchestrator.clone();
    let payload = tokio::spawn(async move { orchestrator.answer(&question).await })
        .await
        .map_err(|e| QaError::Internal(format!("Answer task failed: {}", e)))??;

    Ok(Json(payload))
}

/// Record feedback on an answer
pub async fn feedback(
    State(state): State<Arc<AppState>>,
    body: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, QaError> {
    let Json(request) = body.map_err(invalid_body)?;
    request.validate()?;

    let record = FeedbackRecord {
        timestamp: Utc::now(),
        question: request.question,
        answer: request.answer,
        is_helpful: request.is_helpful,
        comments: request.comments,
    };
    state.feedback.append(&record).await?;

    Ok(Json(MessageResponse {
        status: "success",
        message: "Thank you for your feedback".to_string(),
    }))
}

/// Admin: reload the context and the answerer
pub async fn reload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ReloadResponse>, QaError> {
    let admin = state.orchestrator.admin(AdminAuth::api_key(&headers))?;
    let report = admin.reload().await?;

    Ok(Json(ReloadResponse {
        report,
        status: "success",
    }))
}

/// Admin: replace the context
pub async fn update_context(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ContextRequest>, JsonRejection>,
) -> Result<Json<ContextResponse>, QaError> {
    // Credential is checked before the body
    let admin = state.orchestrator.admin(AdminAuth::api_key(&headers))?;

    let Json(request) = body.map_err(invalid_body)?;
    if request.context.chars().count() < MIN_CONTEXT_CHARS {
        return Err(QaError::InvalidRequest(format!(
            "Context must be at least {} characters",
            MIN_CONTEXT_CHARS
        )));
    }

    let context_size = admin.update_context(&request.context).await?;
    info!(context_size, "Context updated through the API");

    Ok(Json(ContextResponse {
        status: "success",
        message: "Context updated successfully".to_string(),
        context_size,
        cache_cleared: true,
    }))
}

/// Admin: current request metrics
pub async fn metrics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MetricsSnapshot>, QaError> {
    let admin = state.orchestrator.admin(AdminAuth::api_key(&headers))?;
    Ok(Json(admin.metrics().await))
}

/// Admin: zero the request metrics
pub async fn reset_metrics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, QaError> {
    let admin = state.orchestrator.admin(AdminAuth::api_key(&headers))?;
    admin.reset_metrics().await;

    Ok(Json(MessageResponse {
        status: "success",
        message: "Metrics reset successfully".to_string(),
    }))
}

/// Admin: drop every cached answer
pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, QaError> {
    let admin = state.orchestrator.admin(AdminAuth::api_key(&headers))?;
    admin.clear_cache().await;

    Ok(Json(MessageResponse {
        status: "success",
        message: "Cache cleared successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(text: &str) -> QuestionRequest {
        QuestionRequest {
            question: text.to_string(),
        }
    }

    #[test]
    fn test_question_is_trimmed() {
        assert_eq!(
            question("  What is Rust?  ").validate().unwrap(),
            "What is Rust?"
        );
    }

    #[test]
    fn test_question_length_bounds() {
        assert!(question("   ").validate().is_err());
        assert!(question("a").validate().is_err());
        assert!(question("ab").validate().is_ok());
        assert!(question(&"a".repeat(500)).validate().is_ok());
        assert!(question(&"a".repeat(501)).validate().is_err());
    }

    #[test]
    fn test_question_bounds_apply_before_trimming() {
        assert_eq!(question(" a ").validate().unwrap(), "a");
        assert!(question(&format!(" {} ", "a".repeat(499))).validate().is_err());
    }

    #[test]
    fn test_question_rejects_unknown_fields() {
        let parsed: Result<QuestionRequest, _> =
            serde_json::from_str(r#"{"question": "Why?", "extra": 1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (QaError::ServiceUnavailable("down".to_string()), StatusCode::SERVICE_UNAVAILABLE),
            (QaError::NoConfidentAnswer { score: 0.001 }, StatusCode::NOT_FOUND),
            (QaError::Unauthorized, StatusCode::UNAUTHORIZED),
            (QaError::ReloadFailed, StatusCode::INTERNAL_SERVER_ERROR),
            (QaError::InvalidRequest("bad".to_string()), StatusCode::UNPROCESSABLE_ENTITY),
            (QaError::Internal("boom".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_unauthorized_carries_challenge() {
        let response = QaError::Unauthorized.into_response();
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "ApiKey"
        );
    }
}
