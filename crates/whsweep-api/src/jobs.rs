//! Job-scheduling API: submit a multi-task job definition and trigger runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::WorkspaceClient;
use crate::error::{ApiError, ApiResult};

const JOBS: &str = "/api/2.1/jobs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAs {
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbtTask {
    pub project_directory: String,
    pub commands: Vec<String>,
    pub schema: String,
    pub warehouse_id: String,
    pub catalog: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PypiLibrary {
    pub package: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Library {
    pub pypi: PypiLibrary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTask {
    pub task_key: String,
    pub run_if: String,
    pub dbt_task: DbtTask,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_cluster_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<Library>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCluster {
    pub spark_version: String,
    pub node_type_id: String,
    pub num_workers: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_security_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_engine: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCluster {
    pub job_cluster_key: String,
    pub new_cluster: NewCluster,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitSource {
    pub git_url: String,
    pub git_provider: String,
    pub git_branch: String,
}

/// Body of `POST /api/2.1/jobs/create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSettings {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_as: Option<RunAs>,
    pub max_concurrent_runs: u32,
    pub timeout_seconds: u64,
    pub tasks: Vec<JobTask>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub job_clusters: Vec<JobCluster>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_source: Option<GitSource>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateJobResponse {
    job_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct RunNowResponse {
    run_id: i64,
}

/// Coarse run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunLifeCycleState {
    Pending,
    Queued,
    Running,
    Terminating,
    Terminated,
    Skipped,
    InternalError,
    Blocked,
    WaitingForRetry,
    #[serde(other)]
    Unknown,
}

impl RunLifeCycleState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Terminated | Self::Skipped | Self::InternalError
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub life_cycle_state: RunLifeCycleState,
    /// `SUCCESS`, `FAILED`, `TIMEDOUT`, `CANCELED`, ...
    #[serde(default)]
    pub result_state: Option<String>,
    #[serde(default)]
    pub state_message: Option<String>,
}

/// A job run as returned by `runs/get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub run_id: i64,
    pub state: RunState,
    #[serde(default)]
    pub run_page_url: Option<String>,
}

impl JobRun {
    pub fn succeeded(&self) -> bool {
        self.state.life_cycle_state == RunLifeCycleState::Terminated
            && self.state.result_state.as_deref() == Some("SUCCESS")
    }
}

#[async_trait]
pub trait JobsApi: Send + Sync {
    /// Register a job definition, returning its id.
    async fn create_job(&self, settings: &JobSettings) -> ApiResult<i64>;

    /// Trigger a run of an existing job, returning the run id.
    async fn run_now(&self, job_id: i64) -> ApiResult<i64>;

    async fn get_run(&self, run_id: i64) -> ApiResult<JobRun>;

    /// Ask the scheduler to stop a run. A run that already finished is
    /// left as it is.
    async fn cancel_run(&self, run_id: i64) -> ApiResult<()>;

    async fn delete_job(&self, job_id: i64) -> ApiResult<()>;
}

#[async_trait]
impl JobsApi for WorkspaceClient {
    async fn create_job(&self, settings: &JobSettings) -> ApiResult<i64> {
        debug!(name = %settings.name, tasks = settings.tasks.len(), "creating job");
        let body = serde_json::to_value(settings).map_err(|e| ApiError::Config {
            message: format!("failed to encode job settings: {}", e),
        })?;
        let path = format!("{}/create", JOBS);
        let created: CreateJobResponse = self.http.json(Method::POST, &path, Some(body), &[]).await?;
        Ok(created.job_id)
    }

    async fn run_now(&self, job_id: i64) -> ApiResult<i64> {
        let path = format!("{}/run-now", JOBS);
        let body = serde_json::json!({ "job_id": job_id });
        let run: RunNowResponse = self.http.json(Method::POST, &path, Some(body), &[]).await?;
        Ok(run.run_id)
    }

    async fn get_run(&self, run_id: i64) -> ApiResult<JobRun> {
        let path = format!("{}/runs/get", JOBS);
        self.http
            .json(Method::GET, &path, None, &[("run_id", run_id.to_string())])
            .await
    }

    async fn cancel_run(&self, run_id: i64) -> ApiResult<()> {
        debug!(run_id, "cancelling job run");
        let path = format!("{}/runs/cancel", JOBS);
        let body = serde_json::json!({ "run_id": run_id });
        self.http.ack(Method::POST, &path, Some(body)).await
    }

    async fn delete_job(&self, job_id: i64) -> ApiResult<()> {
        debug!(job_id, "deleting job");
        let path = format!("{}/delete", JOBS);
        let body = serde_json::json!({ "job_id": job_id });
        self.http.ack(Method::POST, &path, Some(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_success_requires_terminated_and_success() {
        let mut run = JobRun {
            run_id: 1,
            state: RunState {
                life_cycle_state: RunLifeCycleState::Terminated,
                result_state: Some("SUCCESS".into()),
                state_message: None,
            },
            run_page_url: None,
        };
        assert!(run.succeeded());
        run.state.result_state = Some("FAILED".into());
        assert!(!run.succeeded());
        run.state.life_cycle_state = RunLifeCycleState::Running;
        assert!(!run.state.life_cycle_state.is_terminal());
    }

    #[test]
    fn unknown_lifecycle_state_decodes() {
        let run: JobRun = serde_json::from_str(
            r#"{"run_id":7,"state":{"life_cycle_state":"SOMETHING_ELSE"}}"#,
        )
        .unwrap();
        assert_eq!(run.state.life_cycle_state, RunLifeCycleState::Unknown);
    }
}
