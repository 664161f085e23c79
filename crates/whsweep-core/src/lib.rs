//! Experiment orchestration engine for warehouse benchmark sweeps.
//!
//! A sweep file expands into [`ExperimentConfig`]s ([`sweep`]). Each one is
//! driven by the [`ExperimentOrchestrator`] through
//! provision ([`lifecycle`]), workload ([`workload`]), audit ([`audit`]) and
//! an unconditional cleanup pass ([`cleanup`]).

pub mod audit;
pub mod cleanup;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod model;
pub mod naming;
pub mod orchestrator;
pub mod report;
pub mod sweep;
pub mod workload;

pub use audit::{AuditRecorder, AuditStore, SqliteAuditStore, WarehouseAuditStore};
pub use cleanup::{CleanupCoordinator, CleanupSummary, RetryPolicy};
pub use config::SweepFile;
pub use errors::{
    AuditWriteError, CleanupError, ConfigurationError, ExperimentError, ProvisioningError, Stage,
    WorkloadError,
};
pub use lifecycle::{LifecycleSettings, WarehouseLifecycleManager};
pub use model::{
    BatchId, ComputeType, ExecutionRecord, ExperimentConfig, InvocationRecord, Lease,
    LifecycleState, UnitResult, WarehouseHandle, WarehouseSize, WorkloadOutcome,
};
pub use orchestrator::{ExperimentOrchestrator, OrchestratorSettings};
pub use report::{CleanupStatus, ExperimentOutcome, OutcomeStatus, SweepReport};
pub use sweep::SweepSpec;
pub use workload::{
    DbtCliWorkload, JobWorkload, JobWorkloadSettings, WorkloadInvocation, WorkloadRunner,
    WorkloadVars,
};
