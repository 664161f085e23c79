//! Workspace client shared by the warehouse, statement and jobs APIs.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::auth::TokenProvider;
use crate::error::{ApiError, ApiResult};
use crate::types::ApiConfig;

mod http;

pub(crate) use http::HttpBackend;

pub const CLIENT_USER_AGENT: &str = concat!("whsweep/", env!("CARGO_PKG_VERSION"));

/// Explicitly constructed client; cheap to clone and safe for concurrent use.
#[derive(Debug, Clone)]
pub struct WorkspaceClient {
    pub(crate) http: HttpBackend,
    pub(crate) poll_interval: Duration,
    pub(crate) max_wait: Duration,
}

impl WorkspaceClient {
    pub fn new(config: ApiConfig) -> ApiResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| ApiError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http: HttpBackend {
                client,
                base_url: config.base_url(),
                token_provider: TokenProvider::from_option(config.token.as_ref()),
                max_retries: config.max_retries,
            },
            poll_interval: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
        .with_poll_interval(Duration::from_secs(config.poll_interval_secs))
        .with_max_wait(Duration::from_secs(config.max_wait_secs)))
    }

    pub fn from_env() -> ApiResult<Self> {
        let config = ApiConfig::from_env().ok_or_else(|| ApiError::Config {
            message: "workspace host not set (WHSWEEP_HOST or DATABRICKS_HOST)".to_string(),
        })?;
        Self::new(config)
    }

    /// Interval between status polls of statements and job runs.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Upper bound on how long a statement or job run is polled.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.http.base_url
    }
}
