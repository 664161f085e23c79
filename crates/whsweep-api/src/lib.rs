//! Typed clients for the workspace control planes used by a warehouse sweep.
//!
//! - [`WarehouseApi`]: create/get/list/stop/start/delete named SQL warehouses
//! - [`StatementApi`]: run one SQL statement on a warehouse
//! - [`JobsApi`]: register multi-task jobs and trigger runs
//!
//! All three are implemented by [`WorkspaceClient`], which is explicitly
//! constructed and passed to its consumers; there is no process-wide client.
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `WHSWEEP_HOST` | Workspace host (fallback: `DATABRICKS_HOST`) |
//! | `WHSWEEP_TOKEN` | Access token (fallback: `DATABRICKS_TOKEN`) |
//! | `WHSWEEP_HTTP_TIMEOUT` | Request timeout in seconds (default: 60) |
//! | `WHSWEEP_HTTP_MAX_RETRIES` | Max retries for transient failures (default: 3) |
//! | `WHSWEEP_POLL_INTERVAL` | Seconds between status polls (default: 2) |
//! | `WHSWEEP_MAX_WAIT` | Seconds one statement or run may be polled (default: 21600) |

pub mod auth;
pub mod client;
pub mod error;
pub mod jobs;
pub mod statements;
pub mod types;
pub mod warehouses;

pub use auth::TokenProvider;
pub use client::{WorkspaceClient, CLIENT_USER_AGENT};
pub use error::{ApiError, ApiResult};
pub use jobs::{
    DbtTask, GitSource, JobCluster, JobRun, JobSettings, JobTask, JobsApi, Library, NewCluster,
    PypiLibrary, RunAs, RunLifeCycleState, RunState,
};
pub use statements::{StatementApi, StatementParameter, StatementRequest, StatementResult};
pub use types::{ApiConfig, CreateWarehouseRequest, WarehouseInfo, WarehouseState, WarehouseType};
pub use warehouses::WarehouseApi;
