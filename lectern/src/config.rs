//! Service configuration from the environment
//!
//! Every setting has a default and can be overridden by a `LECTERN_*`
//! environment variable. A `.env` file in the working directory is loaded
//! first when present.

use anyhow::{anyhow, Context, Result};
use lectern_state::CacheConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::answerer::HttpAnswererConfig;
use crate::orchestrator::OrchestratorConfig;

/// Used when no admin key is configured
pub const DEFAULT_ADMIN_API_KEY: &str = "admin-key-change-me";

#[derive(Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub context_path: PathBuf,
    pub model_name: String,
    pub answerer_url: String,
    pub answerer_timeout: Duration,
    pub enable_cors: bool,
    pub allowed_origins: Vec<String>,
    pub max_answer_length: usize,
    pub confidence_threshold: f64,
    pub admin_api_key: String,
    pub cache_ttl: Duration,
    /// Periodic purge interval; `None` disables the periodic task
    pub cache_purge_interval: Option<Duration>,
    pub feedback_log: PathBuf,
    pub static_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            context_path: PathBuf::from("context/context.txt"),
            model_name: "distilbert-base-uncased-distilled-squad".to_string(),
            answerer_url: "http://127.0.0.1:8500".to_string(),
            answerer_timeout: Duration::from_secs(30),
            enable_cors: true,
            allowed_origins: vec!["*".to_string()],
            max_answer_length: 50,
            confidence_threshold: 0.01,
            admin_api_key: DEFAULT_ADMIN_API_KEY.to_string(),
            cache_ttl: Duration::from_secs(3600),
            cache_purge_interval: None,
            feedback_log: PathBuf::from("feedback.log"),
            static_dir: PathBuf::from("static"),
        }
    }
}

impl ServiceConfig {
    /// Load from the process environment (after reading `.env`)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let admin_api_key = match var("LECTERN_ADMIN_API_KEY") {
            Some(key) => key,
            None => {
                warn!("No admin API key configured, falling back to the default key");
                defaults.admin_api_key.clone()
            }
        };

        let purge_secs: u64 = parse_or(&var, "LECTERN_CACHE_PURGE_INTERVAL", 0)?;

        let config = Self {
            host: var("LECTERN_HOST").unwrap_or(defaults.host),
            port: parse_or(&var, "LECTERN_PORT", defaults.port)?,
            context_path: var("LECTERN_CONTEXT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.context_path),
            model_name: var("LECTERN_MODEL_NAME").unwrap_or(defaults.model_name),
            answerer_url: var("LECTERN_ANSWERER_URL").unwrap_or(defaults.answerer_url),
            answerer_timeout: Duration::from_secs(parse_or(
                &var,
                "LECTERN_ANSWERER_TIMEOUT",
                defaults.answerer_timeout.as_secs(),
            )?),
            enable_cors: var("LECTERN_ENABLE_CORS")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.enable_cors),
            allowed_origins: var("LECTERN_ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.allowed_origins),
            max_answer_length: parse_or(
                &var,
                "LECTERN_MAX_ANSWER_LENGTH",
                defaults.max_answer_length,
            )?,
            confidence_threshold: parse_or(
                &var,
                "LECTERN_CONFIDENCE_THRESHOLD",
                defaults.confidence_threshold,
            )?,
            admin_api_key,
            cache_ttl: Duration::from_secs(parse_or(
                &var,
                "LECTERN_CACHE_TIMEOUT",
                defaults.cache_ttl.as_secs(),
            )?),
            cache_purge_interval: (purge_secs > 0).then(|| Duration::from_secs(purge_secs)),
            feedback_log: var("LECTERN_FEEDBACK_LOG")
                .map(PathBuf::from)
                .unwrap_or(defaults.feedback_log),
            static_dir: var("LECTERN_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!(
                "confidence threshold must be between 0 and 1, got {}",
                self.confidence_threshold
            ));
        }
        if self.max_answer_length == 0 {
            return Err(anyhow!("max answer length must be greater than 0"));
        }
        if self.answerer_timeout.is_zero() {
            return Err(anyhow!("answerer timeout must be greater than 0"));
        }
        self.cache_config().validate().map_err(|e| anyhow!(e))?;
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::builder()
            .ttl(self.cache_ttl)
            .enable_auto_purge(self.cache_purge_interval.is_some())
            .purge_interval(self.cache_purge_interval.unwrap_or(Duration::from_secs(300)))
            .build()
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            confidence_threshold: self.confidence_threshold,
            max_answer_length: self.max_answer_length,
            answer_timeout: self.answerer_timeout,
        }
    }

    pub fn answerer_config(&self) -> HttpAnswererConfig {
        HttpAnswererConfig {
            endpoint: self.answerer_url.clone(),
            model: self.model_name.clone(),
            request_timeout: self.answerer_timeout,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, F>(var: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", name, raw)),
        None => Ok(default),
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("context_path", &self.context_path)
            .field("model_name", &self.model_name)
            .field("answerer_url", &self.answerer_url)
            .field("answerer_timeout", &self.answerer_timeout)
            .field("enable_cors", &self.enable_cors)
            .field("allowed_origins", &self.allowed_origins)
            .field("max_answer_length", &self.max_answer_length)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("admin_api_key", &"<redacted>")
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_purge_interval", &self.cache_purge_interval)
            .field("feedback_log", &self.feedback_log)
            .field("static_dir", &self.static_dir)
            .finish()
    }
}
