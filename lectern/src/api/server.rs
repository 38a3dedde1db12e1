//! API server for Lectern

use anyhow::{Context, Result};
use axum::{
    http::HeaderValue,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use lectern_state::cache::start_auto_purge;
use lectern_state::{AnswerCache, ContextStore, MetricsRecorder};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::answerer::HttpAnswerer;
use crate::config::ServiceConfig;
use crate::feedback::FeedbackLog;
use crate::orchestrator::Orchestrator;

use super::auth::AdminAuth;
use super::middleware::process_time;
use super::routes::{
    ask, clear_cache, feedback, metrics, reload, reset_metrics, status, update_context, AppState,
};

/// API server
pub struct ApiServer {
    config: ServiceConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    /// Wire up every component from configuration
    ///
    /// An unreachable answerer is logged and tolerated; questions fail with
    /// 503 until an admin reload brings it back.
    pub async fn build(config: ServiceConfig) -> Result<Self> {
        let context = ContextStore::open(&config.context_path)
            .await
            .with_context(|| format!("Failed to open context at {:?}", config.context_path))?;
        info!(
            "Context loaded from {:?} ({} characters)",
            config.context_path,
            context.get().await.chars().count()
        );

        let answerer = HttpAnswerer::connect(config.answerer_config())
            .await
            .context("Failed to build the answerer client")?;

        let cache = Arc::new(AnswerCache::new(config.cache_config()));
        if cache.config().enable_auto_purge {
            tokio::spawn(start_auto_purge(cache.clone()));
        }

        let orchestrator = Orchestrator::new(
            cache,
            Arc::new(context),
            Arc::new(MetricsRecorder::new()),
            Arc::new(answerer),
            AdminAuth::new(config.admin_api_key.clone()),
        )
        .with_config(config.orchestrator_config());

        Ok(Self::from_parts(config, Arc::new(orchestrator)))
    }

    /// Build around an existing orchestrator
    pub fn from_parts(config: ServiceConfig, orchestrator: Arc<Orchestrator>) -> Self {
        let state = Arc::new(AppState {
            orchestrator,
            feedback: Arc::new(FeedbackLog::new(config.feedback_log.clone())),
            cors_enabled: config.enable_cors,
        });
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        let mut app = Router::new()
            .route("/", get(status))
            .route("/qa", post(ask))
            .route("/feedback", post(feedback))
            // Admin routes check the X-API-Key header themselves
            .route("/reload", post(reload))
            .route("/context", post(update_context))
            .route("/metrics", get(metrics))
            .route("/reset-metrics", post(reset_metrics))
            .route("/clear-cache", post(clear_cache))
            .with_state(self.state.clone());

        if self.config.static_dir.is_dir() {
            app = app.nest_service("/static", ServeDir::new(&self.config.static_dir));
        } else {
            info!(
                "Static directory {:?} not found, /static is disabled",
                self.config.static_dir
            );
        }

        app.layer(
            ServiceBuilder::new()
                .layer(from_fn(process_time))
                .layer(self.cors_layer()),
        )
    }

    fn cors_layer(&self) -> CorsLayer {
        if !self.config.enable_cors {
            return CorsLayer::new();
        }
        if self.config.allowed_origins.iter().any(|o| o == "*") {
            return CorsLayer::permissive();
        }

        let origins: Vec<HeaderValue> = self
            .config
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn start(self) -> Result<()> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("Starting API server on {}", addr);

        self.serve(listener).await
    }

    /// Serve on an already bound listener until Ctrl-C
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;

        info!("Server stopped");
        Ok(())
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.state.orchestrator
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        // Without a signal handler, run until the process is killed
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
