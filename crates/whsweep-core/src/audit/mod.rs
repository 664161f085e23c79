//! Append-only audit of measured work and of the invocations producing it.
//!
//! Table layouts live here as [`TableDef`]s; stores create a table from its
//! definition and add any column an older table lacks. Columns are never
//! dropped or retyped.

pub mod sqlite;
pub mod warehouse;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::AuditWriteError;
use crate::model::{BatchId, ExecutionRecord, ExperimentConfig, InvocationRecord, WarehouseHandle, WorkloadOutcome};
use crate::naming;

pub use sqlite::SqliteAuditStore;
pub use warehouse::WarehouseAuditStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    Timestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
    Column { name, kind }
}

#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [Column],
}

pub const EXECUTIONS: TableDef = TableDef {
    name: "model_run_results",
    columns: &[
        col("batch_id", ColumnKind::Text),
        col("experiment_id", ColumnKind::Text),
        col("warehouse_size", ColumnKind::Text),
        col("warehouse_type", ColumnKind::Text),
        col("threads", ColumnKind::Integer),
        col("schema_name", ColumnKind::Text),
        col("model_name", ColumnKind::Text),
        col("execution_time", ColumnKind::Real),
        col("scaling_factor", ColumnKind::Integer),
        col("zone", ColumnKind::Text),
        col("status", ColumnKind::Text),
        col("recorded_at", ColumnKind::Timestamp),
    ],
};

pub const INVOCATIONS: TableDef = TableDef {
    name: "invocations",
    columns: &[
        col("batch_id", ColumnKind::Text),
        col("experiment_id", ColumnKind::Text),
        col("resource_name", ColumnKind::Text),
        col("warehouse_size", ColumnKind::Text),
        col("warehouse_type", ColumnKind::Text),
        col("threads", ColumnKind::Integer),
        col("iteration", ColumnKind::Integer),
        col("scaling_factor", ColumnKind::Integer),
        col("orchestrator", ColumnKind::Text),
        col("submission_id", ColumnKind::Text),
        col("unit_count", ColumnKind::Integer),
        col("started_at", ColumnKind::Timestamp),
        col("finished_at", ColumnKind::Timestamp),
    ],
};

/// One cell; `None` is SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(Option<String>),
    Integer(Option<i64>),
    Real(Option<f64>),
}

impl Value {
    /// String rendering used for statement parameters.
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Text(v) => v.clone(),
            Self::Integer(v) => v.map(|i| i.to_string()),
            Self::Real(v) => v.map(|f| f.to_string()),
        }
    }
}

fn text(v: impl Into<String>) -> Value {
    Value::Text(Some(v.into()))
}

fn ts(t: &chrono::DateTime<chrono::Utc>) -> Value {
    text(t.to_rfc3339())
}

/// Values in column order of [`EXECUTIONS`].
pub fn execution_row(r: &ExecutionRecord) -> Vec<Value> {
    vec![
        text(r.batch_id.as_str()),
        text(&r.experiment_id),
        text(r.size.as_api_str()),
        text(r.compute_type.as_str()),
        Value::Integer(Some(i64::from(r.threads))),
        text(&r.schema_name),
        text(&r.model_name),
        Value::Real(Some(r.execution_time_seconds)),
        Value::Integer(Some(i64::from(r.scaling_factor))),
        Value::Text(r.zone.clone()),
        Value::Text(r.status.clone()),
        ts(&r.recorded_at),
    ]
}

/// Values in column order of [`INVOCATIONS`].
pub fn invocation_row(r: &InvocationRecord) -> Vec<Value> {
    vec![
        text(r.batch_id.as_str()),
        text(&r.experiment_id),
        text(&r.resource_name),
        text(r.size.as_api_str()),
        text(r.compute_type.as_str()),
        Value::Integer(Some(i64::from(r.threads))),
        Value::Integer(Some(i64::from(r.iteration))),
        Value::Integer(Some(i64::from(r.scaling_factor))),
        text(&r.orchestrator),
        Value::Text(r.submission_id.clone()),
        Value::Integer(Some(i64::from(r.unit_count))),
        ts(&r.started_at),
        ts(&r.finished_at),
    ]
}

/// Durable append-only storage for audit rows.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append rows to `table`, extending its columns first if needed.
    async fn append(&self, table: &TableDef, rows: Vec<Vec<Value>>) -> Result<(), AuditWriteError>;
}

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Persist one execution row per unit, then one invocation row.
    ///
    /// The invocation row is written last and so marks a complete write: a
    /// failed execution append leaves no invocation row claiming its
    /// `unit_count`. Returns the number of execution rows written. Failures
    /// are reported, not retried.
    pub async fn record(
        &self,
        batch_id: &BatchId,
        config: &ExperimentConfig,
        handle: &WarehouseHandle,
        orchestrator: &str,
        outcome: &WorkloadOutcome,
    ) -> Result<usize, AuditWriteError> {
        let recorded_at = chrono::Utc::now();
        let executions: Vec<ExecutionRecord> = outcome
            .units
            .iter()
            .map(|unit| ExecutionRecord {
                batch_id: batch_id.clone(),
                experiment_id: handle.resource_id.clone(),
                size: config.size,
                compute_type: config.compute_type,
                threads: config.threads,
                schema_name: unit.schema.clone(),
                model_name: unit.name.clone(),
                execution_time_seconds: unit.execution_time_seconds,
                scaling_factor: config.scaling_factor,
                zone: naming::zone_of(&unit.schema).map(str::to_string),
                status: unit.status.clone(),
                recorded_at,
            })
            .collect();

        let invocation = InvocationRecord {
            batch_id: batch_id.clone(),
            experiment_id: handle.resource_id.clone(),
            resource_name: handle.resource_name.clone(),
            size: config.size,
            compute_type: config.compute_type,
            threads: config.threads,
            iteration: config.iteration,
            scaling_factor: config.scaling_factor,
            orchestrator: orchestrator.to_string(),
            submission_id: outcome.submission_id.clone(),
            unit_count: u32::try_from(executions.len()).unwrap_or(u32::MAX),
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
        };

        if executions.is_empty() {
            warn!(resource = %handle.resource_name, "workload reported no units of work");
        } else {
            self.store
                .append(&EXECUTIONS, executions.iter().map(execution_row).collect())
                .await?;
        }
        self.store
            .append(&INVOCATIONS, vec![invocation_row(&invocation)])
            .await?;
        info!(
            resource = %handle.resource_name,
            batch_id = %batch_id,
            rows = executions.len(),
            "audit rows recorded"
        );
        Ok(executions.len())
    }
}
