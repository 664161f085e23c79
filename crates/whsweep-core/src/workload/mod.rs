//! Invocation of the external build/query tool against one warehouse.
//!
//! Two runners exist: [`DbtCliWorkload`] spawns the tool locally and
//! [`JobWorkload`] submits it as a scheduled job. Both receive the same
//! [`WorkloadInvocation`] and return every unit of work at once, after the
//! whole invocation has finished.

pub mod command;
pub mod dbt;
pub mod job;
pub mod run_results;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::WorkloadError;
use crate::model::{BatchId, ExperimentConfig, WarehouseHandle, WorkloadOutcome};

pub use command::WorkloadCommand;
pub use dbt::DbtCliWorkload;
pub use job::{JobWorkload, JobWorkloadSettings};

/// Variable map handed to the workload as `--vars`.
///
/// The field names are what the workload's own run-result capture expects:
/// `job_name` carries the compute type, `job_id` the size and `job_run_id`
/// the warehouse id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadVars {
    pub orchestrator: String,
    pub job_name: String,
    pub job_id: String,
    pub job_run_id: String,
    pub warehouse_id: String,
    pub schema: String,
    pub catalog: String,
    pub scaling_factor: u32,
}

/// Everything one workload run needs.
#[derive(Debug, Clone)]
pub struct WorkloadInvocation {
    pub batch_id: BatchId,
    pub config: ExperimentConfig,
    pub handle: WarehouseHandle,
    pub catalog: String,
    /// Base schema; zone schemas are derived from it by the workload.
    pub schema: String,
}

impl WorkloadInvocation {
    pub fn vars(&self, orchestrator: &str) -> WorkloadVars {
        WorkloadVars {
            orchestrator: orchestrator.to_string(),
            job_name: self.config.compute_type.as_str().to_string(),
            job_id: self.config.size.as_api_str().to_string(),
            job_run_id: self.handle.resource_id.clone(),
            warehouse_id: self.handle.resource_id.clone(),
            schema: self.schema.clone(),
            catalog: self.catalog.clone(),
            scaling_factor: self.config.scaling_factor,
        }
    }
}

#[async_trait]
pub trait WorkloadRunner: Send + Sync {
    /// Name recorded as the `orchestrator` of every invocation.
    fn orchestrator(&self) -> &str;

    async fn run(&self, invocation: &WorkloadInvocation) -> Result<WorkloadOutcome, WorkloadError>;

    /// Called after `run` for `invocation` was dropped mid-flight, before the
    /// warehouse is cleaned up. Runners that start work outside this process
    /// stop it here.
    async fn abandon(&self, _invocation: &WorkloadInvocation) {}
}
