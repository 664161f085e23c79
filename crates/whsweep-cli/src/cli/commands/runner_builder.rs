use std::sync::Arc;

use anyhow::Context;
use whsweep_api::WorkspaceClient;
use whsweep_core::audit::AuditStore;
use whsweep_core::config::{AuditKind, WorkloadKind};
use whsweep_core::workload::WorkloadRunner;
use whsweep_core::{
    AuditRecorder, CleanupCoordinator, DbtCliWorkload, ExperimentOrchestrator, JobWorkload,
    SqliteAuditStore, SweepFile, WarehouseAuditStore, WarehouseLifecycleManager,
};

pub(crate) fn workspace_client() -> anyhow::Result<Arc<WorkspaceClient>> {
    let client = WorkspaceClient::from_env().context("workspace credentials")?;
    Ok(Arc::new(client))
}

pub(crate) fn build_cleanup(file: &SweepFile, client: &Arc<WorkspaceClient>) -> CleanupCoordinator {
    let lifecycle = WarehouseLifecycleManager::new(client.clone(), file.lifecycle_settings());
    CleanupCoordinator::new(
        lifecycle,
        client.clone(),
        file.catalog.clone(),
        file.settings.schema_prefix.clone(),
    )
    .with_retry(file.retry_policy())
}

fn build_workload(file: &SweepFile, client: &Arc<WorkspaceClient>) -> Arc<dyn WorkloadRunner> {
    let w = &file.workload;
    match w.kind {
        WorkloadKind::Dbt => {
            let mut dbt = DbtCliWorkload::new(w.program.clone(), w.artifacts_dir.clone())
                .with_timeout(w.timeout());
            dbt.project_dir = w.project_dir.clone();
            dbt.profiles_dir = w.profiles_dir.clone();
            dbt.target = w.target.clone();
            dbt.select = w.select.clone();
            Arc::new(dbt)
        }
        WorkloadKind::Job => Arc::new(JobWorkload::new(
            client.clone(),
            client.clone(),
            file.job_settings(),
        )),
    }
}

fn build_audit_store(
    file: &SweepFile,
    client: &Arc<WorkspaceClient>,
) -> anyhow::Result<Arc<dyn AuditStore>> {
    let store: Arc<dyn AuditStore> = match file.audit.kind {
        AuditKind::Sqlite => Arc::new(
            SqliteAuditStore::open(&file.audit.path)
                .with_context(|| format!("opening audit store {}", file.audit.path.display()))?,
        ),
        AuditKind::Warehouse => {
            let warehouse_id = file
                .audit
                .warehouse_id
                .clone()
                .context("audit.warehouse_id is required for kind: warehouse")?;
            Arc::new(WarehouseAuditStore::new(
                client.clone(),
                warehouse_id,
                file.catalog.clone(),
                file.audit.schema.clone(),
            )?)
        }
    };
    Ok(store)
}

/// Wires every component of a sweep to one shared workspace client.
pub(crate) fn build_orchestrator(
    file: &SweepFile,
    client: Arc<WorkspaceClient>,
) -> anyhow::Result<ExperimentOrchestrator> {
    let lifecycle = WarehouseLifecycleManager::new(client.clone(), file.lifecycle_settings());
    let workload = build_workload(file, &client);
    let recorder = AuditRecorder::new(build_audit_store(file, &client)?);
    let cleanup = build_cleanup(file, &client);
    Ok(ExperimentOrchestrator::new(
        lifecycle,
        workload,
        recorder,
        cleanup,
        file.orchestrator_settings(),
    ))
}
