//! Local workload runner: spawns the build tool as a child process.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::errors::WorkloadError;
use crate::model::WorkloadOutcome;
use crate::workload::{run_results, WorkloadCommand, WorkloadInvocation, WorkloadRunner};

/// Bytes of tool output kept as the failure diagnostic.
const DIAGNOSTIC_TAIL: usize = 4000;

#[derive(Debug, Clone)]
pub struct DbtCliWorkload {
    pub program: PathBuf,
    pub project_dir: Option<PathBuf>,
    pub profiles_dir: Option<PathBuf>,
    pub target: Option<String>,
    pub select: Option<String>,
    pub timeout: Option<Duration>,
    /// Each experiment writes its artifacts to `{artifacts_dir}/{resource_name}`
    /// so concurrent runs never share a `run_results.json`.
    pub artifacts_dir: PathBuf,
}

impl DbtCliWorkload {
    pub fn new(program: impl Into<PathBuf>, artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            project_dir: None,
            profiles_dir: None,
            target: None,
            select: None,
            timeout: None,
            artifacts_dir: artifacts_dir.into(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

fn tail(text: &str) -> &str {
    let text = text.trim_end();
    if text.len() <= DIAGNOSTIC_TAIL {
        return text;
    }
    let mut start = text.len() - DIAGNOSTIC_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[async_trait]
impl WorkloadRunner for DbtCliWorkload {
    fn orchestrator(&self) -> &str {
        "dbt-cli"
    }

    async fn run(&self, invocation: &WorkloadInvocation) -> Result<WorkloadOutcome, WorkloadError> {
        let command = WorkloadCommand {
            threads: invocation.config.threads,
            vars: invocation.vars(self.orchestrator()),
            target: self.target.clone(),
            select: self.select.clone(),
        };
        let target_path = self.artifacts_dir.join(&invocation.handle.resource_name);

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(command.args()?)
            .arg("--target-path")
            .arg(&target_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.project_dir {
            cmd.arg("--project-dir").arg(dir);
        }
        if let Some(dir) = &self.profiles_dir {
            cmd.arg("--profiles-dir").arg(dir);
        }

        info!(
            resource = %invocation.handle.resource_name,
            schema = %invocation.schema,
            threads = invocation.config.threads,
            "starting workload"
        );
        let started_at = chrono::Utc::now();
        let child = cmd.spawn().map_err(|e| WorkloadError::Launch {
            message: format!("{}: {}", self.program.display(), e),
        })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| WorkloadError::TimedOut { after: limit })?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| WorkloadError::Launch {
            message: format!("waiting for workload failed: {}", e),
        })?;
        let finished_at = chrono::Utc::now();

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let combined = format!("{}\n{}", stdout.trim_end(), stderr.trim_end());
            return Err(WorkloadError::Failed {
                status: output.status.to_string(),
                diagnostic: tail(&combined).trim().to_string(),
            });
        }

        let units = run_results::read(&target_path.join("run_results.json"), &invocation.schema).await?;
        debug!(resource = %invocation.handle.resource_name, units = units.len(), "workload finished");
        Ok(WorkloadOutcome {
            units,
            submission_id: None,
            started_at,
            finished_at,
        })
    }
}
