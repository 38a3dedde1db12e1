//! # Lectern
//!
//! A question answering service that extracts answers from a shared,
//! hot-reloadable context through an external [`Answerer`], caching
//! confident answers and recording request metrics.

pub mod answerer;
pub mod api;
pub mod config;
pub mod error;
pub mod feedback;
pub mod orchestrator;

pub use answerer::{AnswerSpan, Answerer, AnswererInfo, HttpAnswerer, HttpAnswererConfig};
pub use api::{AdminAuth, ApiServer};
pub use config::ServiceConfig;
pub use error::{AnswererError, QaError, Result};
pub use feedback::{FeedbackLog, FeedbackRecord};
pub use orchestrator::{
    AdminSession, Orchestrator, OrchestratorConfig, ReloadReport, ServiceStatus,
};
