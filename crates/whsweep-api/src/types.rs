//! Client configuration and warehouse wire types.

use serde::{Deserialize, Serialize};

/// Connection settings shared by every control-plane client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Workspace host, with or without scheme.
    pub host: String,

    /// Personal access token.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds between status polls of statements and job runs.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Upper bound in seconds on polling one statement or job run.
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
}

fn default_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_poll_interval() -> u64 {
    2
}

fn default_max_wait() -> u64 {
    6 * 60 * 60
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn first_env(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.trim().is_empty())
}

impl ApiConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            token: None,
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            poll_interval_secs: default_poll_interval(),
            max_wait_secs: default_max_wait(),
        }
    }

    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `WHSWEEP_HOST` / `DATABRICKS_HOST` | Workspace host |
    /// | `WHSWEEP_TOKEN` / `DATABRICKS_TOKEN` | Access token |
    /// | `WHSWEEP_HTTP_TIMEOUT` | Request timeout in seconds (default: 60) |
    /// | `WHSWEEP_HTTP_MAX_RETRIES` | Max retries for transient failures (default: 3) |
    /// | `WHSWEEP_POLL_INTERVAL` | Seconds between status polls (default: 2) |
    /// | `WHSWEEP_MAX_WAIT` | Seconds one statement or run may be polled (default: 21600) |
    pub fn from_env() -> Option<Self> {
        let host = first_env(&["WHSWEEP_HOST", "DATABRICKS_HOST"])?;
        Some(Self {
            host,
            token: first_env(&["WHSWEEP_TOKEN", "DATABRICKS_TOKEN"]),
            timeout_secs: env_parsed("WHSWEEP_HTTP_TIMEOUT").unwrap_or_else(default_timeout),
            max_retries: env_parsed("WHSWEEP_HTTP_MAX_RETRIES")
                .unwrap_or_else(default_max_retries),
            poll_interval_secs: env_parsed("WHSWEEP_POLL_INTERVAL")
                .unwrap_or_else(default_poll_interval),
            max_wait_secs: env_parsed("WHSWEEP_MAX_WAIT").unwrap_or_else(default_max_wait),
        })
    }

    /// Set the token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Base URL with scheme and without trailing slash.
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        }
    }
}

/// Warehouse tier as understood by the provisioning API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarehouseType {
    Pro,
    Classic,
    #[serde(other)]
    TypeUnspecified,
}

/// Lifecycle state reported by the provisioning API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarehouseState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Deleting,
    Deleted,
    #[serde(other)]
    Unknown,
}

impl WarehouseState {
    pub fn is_gone(self) -> bool {
        matches!(self, Self::Deleting | Self::Deleted)
    }
}

/// Body of `POST /api/2.0/sql/warehouses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateWarehouseRequest {
    pub name: String,
    pub cluster_size: String,
    pub warehouse_type: WarehouseType,
    pub enable_serverless_compute: bool,
    pub min_num_clusters: u32,
    pub max_num_clusters: u32,
    pub auto_stop_mins: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CreateWarehouseResponse {
    pub id: String,
}

/// Warehouse as returned by get/list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseInfo {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub state: Option<WarehouseState>,

    #[serde(default)]
    pub cluster_size: Option<String>,

    #[serde(default)]
    pub warehouse_type: Option<WarehouseType>,

    #[serde(default)]
    pub enable_serverless_compute: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct ListWarehousesResponse {
    #[serde(default)]
    pub warehouses: Vec<WarehouseInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_adds_scheme_and_strips_slash() {
        assert_eq!(
            ApiConfig::new("dbc-123.cloud.example.com/").base_url(),
            "https://dbc-123.cloud.example.com"
        );
        assert_eq!(
            ApiConfig::new("http://127.0.0.1:8080").base_url(),
            "http://127.0.0.1:8080"
        );
    }

    #[test]
    fn unknown_states_do_not_fail_decoding() {
        let info: WarehouseInfo =
            serde_json::from_str(r#"{"id":"abc","name":"w","state":"SOMETHING_NEW"}"#).unwrap();
        assert_eq!(info.state, Some(WarehouseState::Unknown));
    }

    #[test]
    fn polling_defaults_fill_missing_fields() {
        let cfg: ApiConfig = serde_json::from_str(r#"{"host":"h","poll_interval_secs":5}"#).unwrap();
        assert_eq!(cfg.poll_interval_secs, 5);
        assert_eq!(cfg.max_wait_secs, 6 * 60 * 60);
        assert_eq!(cfg.timeout_secs, 60);
    }

    #[test]
    fn token_is_never_serialized() {
        let cfg = ApiConfig::new("host").with_token("secret");
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("secret"));
    }
}
