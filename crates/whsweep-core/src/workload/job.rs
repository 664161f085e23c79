//! Remote workload runner: submits the build as a multi-task job and reads
//! the unit timings back from the experiment schema.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use whsweep_api::{
    DbtTask, GitSource, JobCluster, JobSettings, JobTask, JobsApi, Library, NewCluster,
    PypiLibrary, RunAs, StatementApi, StatementRequest,
};

use crate::errors::WorkloadError;
use crate::model::{UnitResult, WorkloadOutcome};
use crate::naming;
use crate::workload::{WorkloadCommand, WorkloadInvocation, WorkloadRunner};

/// Table the workload's run-result capture writes into the base schema.
pub const RESULTS_TABLE: &str = "model_run_results";

/// Column of [`RESULTS_TABLE`] holding when the row's run produced it.
pub const RESULTS_TIME_COLUMN: &str = "generated_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobWorkloadSettings {
    pub job_name: String,
    pub task_key: String,
    /// User the job runs as.
    pub creator: Option<String>,
    pub package: String,
    pub project_directory: String,
    pub spark_version: String,
    pub node_type_id: String,
    pub num_workers: u32,
    pub git_url: Option<String>,
    pub git_provider: String,
    pub git_branch: String,
    pub target: Option<String>,
    pub select: Option<String>,
    #[serde(with = "secs")]
    pub poll_interval: Duration,
    #[serde(with = "opt_secs")]
    pub timeout: Option<Duration>,
}

impl Default for JobWorkloadSettings {
    fn default() -> Self {
        Self {
            job_name: "dbt-sql-tpcdi".to_string(),
            task_key: "run-dbt-tpcdi".to_string(),
            creator: None,
            package: "dbt-databricks==1.6.4".to_string(),
            project_directory: String::new(),
            spark_version: "14.0.x-scala2.12".to_string(),
            node_type_id: "m5d.large".to_string(),
            num_workers: 2,
            git_url: None,
            git_provider: "gitHub".to_string(),
            git_branch: "main".to_string(),
            target: None,
            select: None,
            poll_interval: Duration::from_secs(30),
            timeout: None,
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

/// A job this runner registered and has not retired yet.
#[derive(Debug, Clone, Copy)]
struct Submission {
    job_id: i64,
    run_id: Option<i64>,
    finished: bool,
}

pub struct JobWorkload {
    jobs: Arc<dyn JobsApi>,
    statements: Arc<dyn StatementApi>,
    settings: JobWorkloadSettings,
    /// Keyed by resource name.
    active: Mutex<HashMap<String, Submission>>,
}

impl JobWorkload {
    pub fn new(
        jobs: Arc<dyn JobsApi>,
        statements: Arc<dyn StatementApi>,
        settings: JobWorkloadSettings,
    ) -> Self {
        Self {
            jobs,
            statements,
            settings,
            active: Mutex::new(HashMap::new()),
        }
    }

    fn update(&self, key: &str, f: impl FnOnce(&mut Submission)) {
        if let Ok(mut active) = self.active.lock() {
            if let Some(sub) = active.get_mut(key) {
                f(sub);
            }
        }
    }

    fn take(&self, key: &str) -> Option<Submission> {
        self.active.lock().ok().and_then(|mut active| active.remove(key))
    }

    /// Cancel the run unless it reached a terminal state, then delete the job.
    /// Failures are logged; the warehouse cleanup that follows does not
    /// depend on them.
    async fn retire(&self, key: &str, sub: Submission) {
        if let (Some(run_id), false) = (sub.run_id, sub.finished) {
            match self.jobs.cancel_run(run_id).await {
                Ok(()) => info!(resource = %key, run_id, "job run cancelled"),
                Err(e) => warn!(resource = %key, run_id, error = %e, "could not cancel job run"),
            }
        }
        match self.jobs.delete_job(sub.job_id).await {
            Ok(()) => debug!(resource = %key, job_id = sub.job_id, "job deleted"),
            Err(e) => warn!(resource = %key, job_id = sub.job_id, error = %e, "could not delete job"),
        }
    }

    /// Job definition for one experiment.
    ///
    /// The job name is `{job_name}-{resource_name}` and carries no batch id:
    /// the batch id travels in the `batch_id` tag, and the resource name is
    /// already unique within a batch.
    pub fn job_settings(&self, invocation: &WorkloadInvocation) -> Result<JobSettings, WorkloadError> {
        let s = &self.settings;
        let command = WorkloadCommand {
            threads: invocation.config.threads,
            vars: invocation.vars(self.orchestrator()),
            target: s.target.clone(),
            select: s.select.clone(),
        };
        let cluster_key = format!("{}-cluster", s.job_name);
        let warehouse_id = invocation.handle.resource_id.clone();

        let tags = BTreeMap::from([
            ("batch_id".to_string(), invocation.batch_id.to_string()),
            ("job_name".to_string(), s.job_name.clone()),
            ("scaling_factor".to_string(), invocation.config.scaling_factor.to_string()),
            ("warehouse_id".to_string(), warehouse_id.clone()),
            ("warehouse_size".to_string(), invocation.config.size.to_string()),
            ("warehouse_type".to_string(), invocation.config.compute_type.to_string()),
        ]);

        Ok(JobSettings {
            name: format!("{}-{}", s.job_name, invocation.handle.resource_name),
            run_as: s.creator.clone().map(|user_name| RunAs { user_name }),
            max_concurrent_runs: 1,
            timeout_seconds: s.timeout.map(|t| t.as_secs()).unwrap_or(0),
            tasks: vec![JobTask {
                task_key: s.task_key.clone(),
                run_if: "ALL_SUCCESS".to_string(),
                dbt_task: DbtTask {
                    project_directory: s.project_directory.clone(),
                    commands: vec!["dbt deps".to_string(), command.command_line("dbt")?],
                    schema: invocation.schema.clone(),
                    warehouse_id,
                    catalog: invocation.catalog.clone(),
                },
                job_cluster_key: Some(cluster_key.clone()),
                libraries: vec![Library {
                    pypi: PypiLibrary {
                        package: s.package.clone(),
                    },
                }],
                timeout_seconds: 0,
            }],
            job_clusters: vec![JobCluster {
                job_cluster_key: cluster_key,
                new_cluster: NewCluster {
                    spark_version: s.spark_version.clone(),
                    node_type_id: s.node_type_id.clone(),
                    num_workers: s.num_workers,
                    data_security_mode: Some("SINGLE_USER".to_string()),
                    runtime_engine: Some("PHOTON".to_string()),
                },
            }],
            git_source: s.git_url.clone().map(|git_url| GitSource {
                git_url,
                git_provider: s.git_provider.clone(),
                git_branch: s.git_branch.clone(),
            }),
            tags,
            format: "MULTI_TASK".to_string(),
        })
    }

    async fn wait_for_run(&self, key: &str, run_id: i64) -> Result<(), WorkloadError> {
        let started = Instant::now();
        loop {
            let run = self.jobs.get_run(run_id).await?;
            if run.state.life_cycle_state.is_terminal() {
                self.update(key, |sub| sub.finished = true);
                if run.succeeded() {
                    return Ok(());
                }
                return Err(WorkloadError::Failed {
                    status: run
                        .state
                        .result_state
                        .unwrap_or_else(|| format!("{:?}", run.state.life_cycle_state)),
                    diagnostic: run
                        .state
                        .state_message
                        .unwrap_or_else(|| format!("run {} did not succeed", run_id)),
                });
            }
            if let Some(limit) = self.settings.timeout {
                if started.elapsed() >= limit {
                    warn!(run_id, after = ?limit, "job run exceeded its time limit");
                    return Err(WorkloadError::TimedOut { after: limit });
                }
            }
            debug!(run_id, state = ?run.state.life_cycle_state, "job run in progress");
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// Unit timings written by this run. The results table outlives runs
    /// (a recovered warehouse keeps its id and so its schema), so rows older
    /// than the submission are skipped.
    async fn read_units(
        &self,
        invocation: &WorkloadInvocation,
        since: DateTime<Utc>,
    ) -> Result<Vec<UnitResult>, WorkloadError> {
        let table = format!(
            "{}.{}",
            naming::qualified(&invocation.catalog, &invocation.schema),
            naming::quote_identifier(RESULTS_TABLE)
        );
        let request = StatementRequest::new(
            format!(
                "SELECT schema_name, name, execution_time, status FROM {} WHERE {} >= :since",
                table,
                naming::quote_identifier(RESULTS_TIME_COLUMN)
            ),
            &invocation.handle.resource_id,
        )
        .typed_param(
            "since",
            Some(since.to_rfc3339_opts(SecondsFormat::Millis, true)),
            "TIMESTAMP",
        );
        let result = self.statements.execute(&request).await?;

        result
            .records()
            .into_iter()
            .map(|row| {
                let get = |k: &str| row.get(k).cloned().flatten();
                let name = get("name").ok_or_else(|| WorkloadError::Results {
                    message: format!("{} row without name", RESULTS_TABLE),
                })?;
                let execution_time_seconds = match get("execution_time") {
                    Some(v) => v.parse::<f64>().map_err(|e| WorkloadError::Results {
                        message: format!("bad execution_time {:?} for {}: {}", v, name, e),
                    })?,
                    None => 0.0,
                };
                Ok(UnitResult {
                    schema: get("schema_name").unwrap_or_else(|| invocation.schema.clone()),
                    name,
                    execution_time_seconds,
                    status: get("status"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl WorkloadRunner for JobWorkload {
    fn orchestrator(&self) -> &str {
        "databricks-job"
    }

    /// The job is deleted on every path, and a run that is still going when
    /// this returns early (timeout, polling error) is cancelled first.
    async fn run(&self, invocation: &WorkloadInvocation) -> Result<WorkloadOutcome, WorkloadError> {
        let settings = self.job_settings(invocation)?;
        let key = invocation.handle.resource_name.as_str();
        let started_at = Utc::now();
        let job_id = self.jobs.create_job(&settings).await?;
        if let Ok(mut active) = self.active.lock() {
            active.insert(
                key.to_string(),
                Submission {
                    job_id,
                    run_id: None,
                    finished: false,
                },
            );
        }

        let result = self.drive(key, job_id, invocation, started_at).await;
        if let Some(sub) = self.take(key) {
            self.retire(key, sub).await;
        }
        result
    }

    async fn abandon(&self, invocation: &WorkloadInvocation) {
        let key = invocation.handle.resource_name.as_str();
        if let Some(sub) = self.take(key) {
            warn!(resource = %key, job_id = sub.job_id, "abandoning job submission");
            self.retire(key, sub).await;
        }
    }
}

impl JobWorkload {
    async fn drive(
        &self,
        key: &str,
        job_id: i64,
        invocation: &WorkloadInvocation,
        started_at: DateTime<Utc>,
    ) -> Result<WorkloadOutcome, WorkloadError> {
        let run_id = self.jobs.run_now(job_id).await?;
        self.update(key, |sub| sub.run_id = Some(run_id));
        info!(resource = %key, job_id, run_id, "job submitted");

        self.wait_for_run(key, run_id).await?;
        let finished_at = Utc::now();
        let units = self.read_units(invocation, started_at).await?;

        Ok(WorkloadOutcome {
            units,
            submission_id: Some(job_id.to_string()),
            started_at,
            finished_at,
        })
    }
}
