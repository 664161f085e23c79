//! Sweep driver: `acquire -> run -> record -> cleanup (always)` per
//! configuration, sequentially or with a bounded worker pool.

use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::audit::AuditRecorder;
use crate::cleanup::CleanupCoordinator;
use crate::errors::{ExperimentError, Stage};
use crate::lifecycle::WarehouseLifecycleManager;
use crate::model::{BatchId, ExperimentConfig, Lease, WarehouseHandle};
use crate::naming;
use crate::report::{CleanupStatus, ExperimentOutcome, OutcomeStatus, SweepReport};
use crate::workload::{WorkloadInvocation, WorkloadRunner};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Concurrent experiment ceiling; `1` is strictly sequential.
    pub parallelism: usize,
    pub catalog: String,
    pub schema_prefix: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            parallelism: 1,
            catalog: "tpcdi".to_string(),
            schema_prefix: naming::DEFAULT_SCHEMA_PREFIX.to_string(),
        }
    }
}

/// Completes once the cancellation flag is raised. Never completes if the
/// sender is gone without raising it.
async fn cancelled(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// What the pipeline produced before cleanup.
#[derive(Default)]
struct Progress {
    schema: Option<String>,
    submission_id: Option<String>,
    records_written: usize,
}

#[derive(Clone)]
pub struct ExperimentOrchestrator {
    lifecycle: WarehouseLifecycleManager,
    workload: Arc<dyn WorkloadRunner>,
    recorder: AuditRecorder,
    cleanup: CleanupCoordinator,
    settings: OrchestratorSettings,
    cancel: watch::Receiver<bool>,
}

impl ExperimentOrchestrator {
    pub fn new(
        lifecycle: WarehouseLifecycleManager,
        workload: Arc<dyn WorkloadRunner>,
        recorder: AuditRecorder,
        cleanup: CleanupCoordinator,
        settings: OrchestratorSettings,
    ) -> Self {
        let (_, cancel) = watch::channel(false);
        Self {
            lifecycle,
            workload,
            recorder,
            cleanup,
            settings,
            cancel,
        }
    }

    /// Abort the sweep when the flag behind `cancel` turns true.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Run every configuration. Per-configuration failures are recorded in
    /// the report and never stop the sweep. Outcomes follow input order.
    pub async fn run_sweep(&self, batch_id: &BatchId, configs: Vec<ExperimentConfig>) -> SweepReport {
        let parallelism = self.settings.parallelism.max(1);
        info!(
            batch_id = %batch_id,
            configurations = configs.len(),
            parallelism,
            "starting sweep"
        );

        let sem = Arc::new(Semaphore::new(parallelism));
        let mut join_set = JoinSet::new();
        let mut slots: Vec<Option<ExperimentOutcome>> = vec![None; configs.len()];
        let mut started = vec![false; configs.len()];

        for (index, config) in configs.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancelled(self.cancel.clone()) => None,
                permit = sem.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                break;
            };
            if self.is_cancelled() {
                break;
            }
            let this = self.clone();
            let batch_id = batch_id.clone();
            let config = *config;
            started[index] = true;
            join_set.spawn(async move {
                let _permit = permit;
                (index, this.run_experiment(&batch_id, config).await)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!(error = %e, "experiment task panicked"),
            }
        }

        // A started experiment without an outcome panicked somewhere between
        // acquire and cleanup, so its warehouse may still exist.
        let outcomes = slots
            .into_iter()
            .zip(started)
            .zip(configs)
            .map(|((slot, started), config)| match slot {
                Some(outcome) => outcome,
                None if started => ExperimentOutcome::aborted(config),
                None => ExperimentOutcome::not_started(config),
            })
            .collect();
        let report = SweepReport {
            batch_id: batch_id.clone(),
            outcomes,
        };
        info!(
            batch_id = %batch_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            "sweep finished"
        );
        report
    }

    /// One full experiment. Cleanup runs on every path once the experiment
    /// has started, including cancellation.
    pub async fn run_experiment(&self, batch_id: &BatchId, config: ExperimentConfig) -> ExperimentOutcome {
        if self.is_cancelled() {
            return ExperimentOutcome::not_started(config);
        }
        let resource_name = config.resource_name();
        info!(batch_id = %batch_id, %config, resource = %resource_name, "starting experiment");

        let acquired = tokio::select! {
            biased;
            _ = cancelled(self.cancel.clone()) => Err(ExperimentError::Cancelled { stage: Stage::Provisioning }),
            r = self.lifecycle.acquire(&config) => r.map_err(ExperimentError::from),
        };

        let mut progress = Progress::default();
        let (lease, result) = match acquired {
            Ok(handle) => {
                let result = self.execute(batch_id, &config, &handle, &mut progress).await;
                (Lease::Active(handle), result)
            }
            Err(e) => {
                let resource_id = match &e {
                    ExperimentError::Provisioning(p) => p.resource_id.clone(),
                    _ => None,
                };
                let lease = Lease::Partial {
                    resource_name: resource_name.clone(),
                    resource_id,
                };
                (lease, Err(e))
            }
        };

        let cleanup = self.cleanup.cleanup(&lease).await;
        let resource_id = match &cleanup {
            Ok(summary) => summary.resource_id.clone(),
            Err(e) => e.resource_id.clone(),
        }
        .or_else(|| lease.resource_id().map(str::to_string));

        let cleanup_status = match &cleanup {
            Ok(summary) if summary.resource_id.is_none() => CleanupStatus::NothingToClean,
            Ok(_) => CleanupStatus::Clean,
            Err(e) => CleanupStatus::NeedsAttention {
                failures: e.failures.clone(),
            },
        };

        // The earliest failure wins; a cleanup failure only surfaces as the
        // experiment's error when nothing failed before it.
        let result = match (result, cleanup) {
            (Err(e), _) => Err(e),
            (Ok(()), Err(e)) => Err(ExperimentError::from(e)),
            (Ok(()), Ok(_)) => Ok(()),
        };

        let (status, failed_stage, error) = match &result {
            Ok(()) => {
                info!(resource = %resource_name, records = progress.records_written, "experiment succeeded");
                (OutcomeStatus::Succeeded, None, None)
            }
            Err(e) if e.is_cancellation() => {
                warn!(%config, resource = %resource_name, stage = %e.stage(), "experiment cancelled");
                (OutcomeStatus::Cancelled, Some(e.stage()), Some(e.to_string()))
            }
            Err(e) => {
                error!(%config, resource = %resource_name, stage = %e.stage(), error = %e, "experiment failed");
                (OutcomeStatus::Failed, Some(e.stage()), Some(e.to_string()))
            }
        };

        ExperimentOutcome {
            config,
            resource_name,
            resource_id,
            schema: progress.schema,
            submission_id: progress.submission_id,
            records_written: progress.records_written,
            status,
            failed_stage,
            error,
            cleanup: cleanup_status,
        }
    }

    /// `run -> record` against an active warehouse.
    async fn execute(
        &self,
        batch_id: &BatchId,
        config: &ExperimentConfig,
        handle: &WarehouseHandle,
        progress: &mut Progress,
    ) -> Result<(), ExperimentError> {
        naming::validate_identifier("catalog", &self.settings.catalog)?;
        let schema = naming::experiment_schema(&self.settings.schema_prefix, &handle.resource_id)?;
        progress.schema = Some(schema.clone());

        let invocation = WorkloadInvocation {
            batch_id: batch_id.clone(),
            config: *config,
            handle: handle.clone(),
            catalog: self.settings.catalog.clone(),
            schema,
        };

        let run = tokio::select! {
            biased;
            _ = cancelled(self.cancel.clone()) => None,
            r = self.workload.run(&invocation) => Some(r),
        };
        let Some(run) = run else {
            self.workload.abandon(&invocation).await;
            return Err(ExperimentError::Cancelled {
                stage: Stage::Workload,
            });
        };
        let outcome = run?;
        progress.submission_id = outcome.submission_id.clone();

        progress.records_written = self
            .recorder
            .record(batch_id, config, handle, self.workload.orchestrator(), &outcome)
            .await?;
        Ok(())
    }
}
