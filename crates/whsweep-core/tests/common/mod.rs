//! In-memory fakes of the control planes, the workload and the audit store.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use whsweep_api::{
    ApiError, ApiResult, CreateWarehouseRequest, JobRun, JobSettings, JobsApi, RunLifeCycleState,
    RunState, StatementApi, StatementRequest, StatementResult, WarehouseApi, WarehouseInfo,
    WarehouseState,
};
use whsweep_core::audit::{AuditStore, TableDef, Value};
use whsweep_core::{
    AuditRecorder, AuditWriteError, BatchId, CleanupCoordinator, ComputeType, ExperimentConfig,
    ExperimentOrchestrator, LifecycleSettings, OrchestratorSettings, RetryPolicy, UnitResult,
    WarehouseLifecycleManager, WarehouseSize, WorkloadError, WorkloadInvocation, WorkloadOutcome,
    WorkloadRunner,
};

pub fn config(size: WarehouseSize, compute_type: ComputeType, threads: u32) -> ExperimentConfig {
    ExperimentConfig {
        size,
        compute_type,
        threads,
        iteration: 1,
        scaling_factor: 10,
    }
}

pub fn fast_lifecycle() -> LifecycleSettings {
    LifecycleSettings {
        auto_stop_mins: 10,
        poll_interval: Duration::from_millis(1),
        ready_timeout: Duration::from_millis(200),
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

// ---------------------------------------------------------------------------
// Provisioning API
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct WarehouseTable {
    pub warehouses: BTreeMap<String, WarehouseInfo>,
    pub calls: Vec<String>,
    pub next_id: usize,
    /// Number of `get` polls a new warehouse spends in STARTING.
    pub startup_polls: usize,
    pub pending_polls: BTreeMap<String, usize>,
    /// Every create fails with this error instead of creating.
    pub create_error: Option<fn() -> ApiError>,
    /// Remaining delete calls that fail with a server error.
    pub delete_failures: usize,
    pub last_create: Option<CreateWarehouseRequest>,
}

#[derive(Default, Clone)]
pub struct FakeWarehouses {
    pub inner: Arc<Mutex<WarehouseTable>>,
}

impl FakeWarehouses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-existing warehouse, as left behind by a crashed run.
    pub fn seed(&self, id: &str, name: &str, state: WarehouseState) {
        self.inner.lock().unwrap().warehouses.insert(
            id.to_string(),
            WarehouseInfo {
                id: id.to_string(),
                name: name.to_string(),
                state: Some(state),
                cluster_size: Some("Small".into()),
                warehouse_type: None,
                enable_serverless_compute: None,
            },
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn live(&self) -> Vec<WarehouseInfo> {
        self.inner.lock().unwrap().warehouses.values().cloned().collect()
    }

    pub fn state_of(&self, id: &str) -> Option<WarehouseState> {
        self.inner
            .lock()
            .unwrap()
            .warehouses
            .get(id)
            .and_then(|w| w.state)
    }

    fn not_found(id: &str) -> ApiError {
        ApiError::NotFound {
            message: format!("warehouse {} does not exist", id),
        }
    }
}

#[async_trait]
impl WarehouseApi for FakeWarehouses {
    async fn create(&self, request: &CreateWarehouseRequest) -> ApiResult<String> {
        let mut t = self.inner.lock().unwrap();
        t.calls.push(format!("create:{}", request.name));
        t.last_create = Some(request.clone());
        if let Some(make) = t.create_error {
            return Err(make());
        }
        if t.warehouses.values().any(|w| w.name == request.name) {
            return Err(ApiError::AlreadyExists {
                message: format!("SQL warehouse with name `{}` already exists", request.name),
            });
        }
        t.next_id += 1;
        let id = format!("wh{:04}", t.next_id);
        let polls = t.startup_polls;
        t.pending_polls.insert(id.clone(), polls);
        t.warehouses.insert(
            id.clone(),
            WarehouseInfo {
                id: id.clone(),
                name: request.name.clone(),
                state: Some(WarehouseState::Starting),
                cluster_size: Some(request.cluster_size.clone()),
                warehouse_type: Some(request.warehouse_type),
                enable_serverless_compute: Some(request.enable_serverless_compute),
            },
        );
        Ok(id)
    }

    async fn get(&self, id: &str) -> ApiResult<WarehouseInfo> {
        let mut t = self.inner.lock().unwrap();
        t.calls.push(format!("get:{}", id));
        let remaining = t.pending_polls.get(id).copied().unwrap_or(0);
        if remaining > 0 {
            t.pending_polls.insert(id.to_string(), remaining - 1);
        } else if let Some(w) = t.warehouses.get_mut(id) {
            if w.state == Some(WarehouseState::Starting) {
                w.state = Some(WarehouseState::Running);
            }
            if w.state == Some(WarehouseState::Stopping) {
                w.state = Some(WarehouseState::Stopped);
            }
        }
        t.warehouses.get(id).cloned().ok_or_else(|| Self::not_found(id))
    }

    async fn list(&self) -> ApiResult<Vec<WarehouseInfo>> {
        let mut t = self.inner.lock().unwrap();
        t.calls.push("list".to_string());
        Ok(t.warehouses.values().cloned().collect())
    }

    async fn stop(&self, id: &str) -> ApiResult<()> {
        let mut t = self.inner.lock().unwrap();
        t.calls.push(format!("stop:{}", id));
        let w = t.warehouses.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        if w.state != Some(WarehouseState::Stopped) {
            w.state = Some(WarehouseState::Stopping);
        }
        Ok(())
    }

    async fn start(&self, id: &str) -> ApiResult<()> {
        let mut t = self.inner.lock().unwrap();
        t.calls.push(format!("start:{}", id));
        let w = t.warehouses.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        w.state = Some(WarehouseState::Starting);
        Ok(())
    }

    async fn delete(&self, id: &str) -> ApiResult<()> {
        let mut t = self.inner.lock().unwrap();
        t.calls.push(format!("delete:{}", id));
        if t.delete_failures > 0 {
            t.delete_failures -= 1;
            return Err(ApiError::Server {
                status: 503,
                message: "temporarily unavailable".into(),
            });
        }
        t.warehouses
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(id))
    }
}

// ---------------------------------------------------------------------------
// Statement-execution API
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct StatementLog {
    pub requests: Vec<StatementRequest>,
    /// Statements containing this text fail.
    pub fail_matching: Option<String>,
    /// The n-th statement (1-based) fails.
    pub fail_nth: Option<usize>,
    /// Canned results for statements containing the key.
    pub results: Vec<(String, StatementResult)>,
}

#[derive(Default, Clone)]
pub struct FakeStatements {
    pub inner: Arc<Mutex<StatementLog>>,
}

impl FakeStatements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_matching(&self, needle: &str) {
        self.inner.lock().unwrap().fail_matching = Some(needle.to_string());
    }

    pub fn fail_nth(&self, n: usize) {
        self.inner.lock().unwrap().fail_nth = Some(n);
    }

    pub fn respond(&self, needle: &str, columns: &[&str], rows: Vec<Vec<Option<&str>>>) {
        self.inner.lock().unwrap().results.push((
            needle.to_string(),
            StatementResult {
                statement_id: "st".into(),
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: rows
                    .into_iter()
                    .map(|r| r.into_iter().map(|v| v.map(str::to_string)).collect())
                    .collect(),
            },
        ));
    }

    pub fn requests(&self) -> Vec<StatementRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.statement).collect()
    }
}

#[async_trait]
impl StatementApi for FakeStatements {
    async fn execute(&self, request: &StatementRequest) -> ApiResult<StatementResult> {
        let mut log = self.inner.lock().unwrap();
        log.requests.push(request.clone());
        if log.fail_nth == Some(log.requests.len()) {
            return Err(ApiError::StatementFailed {
                statement_id: "st".into(),
                state: "FAILED".into(),
                message: "injected failure".into(),
            });
        }
        if let Some(needle) = &log.fail_matching {
            if request.statement.contains(needle.as_str()) {
                return Err(ApiError::StatementFailed {
                    statement_id: "st".into(),
                    state: "FAILED".into(),
                    message: format!("injected failure for {}", needle),
                });
            }
        }
        Ok(log
            .results
            .iter()
            .find(|(needle, _)| request.statement.contains(needle.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Job-scheduling API
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct JobLog {
    pub created: Vec<JobSettings>,
    pub runs: Vec<i64>,
    pub cancelled: Vec<i64>,
    pub deleted: Vec<i64>,
    /// `get_run` answers RUNNING this many times before terminating.
    pub running_polls: usize,
    pub result_state: Option<String>,
}

#[derive(Default, Clone)]
pub struct FakeJobs {
    pub inner: Arc<Mutex<JobLog>>,
}

#[async_trait]
impl JobsApi for FakeJobs {
    async fn create_job(&self, settings: &JobSettings) -> ApiResult<i64> {
        let mut log = self.inner.lock().unwrap();
        log.created.push(settings.clone());
        Ok(100 + log.created.len() as i64)
    }

    async fn run_now(&self, job_id: i64) -> ApiResult<i64> {
        let mut log = self.inner.lock().unwrap();
        log.runs.push(job_id);
        Ok(job_id * 10)
    }

    async fn get_run(&self, run_id: i64) -> ApiResult<JobRun> {
        let mut log = self.inner.lock().unwrap();
        let state = if log.running_polls > 0 {
            log.running_polls -= 1;
            RunState {
                life_cycle_state: RunLifeCycleState::Running,
                result_state: None,
                state_message: None,
            }
        } else {
            RunState {
                life_cycle_state: RunLifeCycleState::Terminated,
                result_state: Some(
                    log.result_state
                        .clone()
                        .unwrap_or_else(|| "SUCCESS".to_string()),
                ),
                state_message: Some("run finished".to_string()),
            }
        };
        Ok(JobRun {
            run_id,
            state,
            run_page_url: None,
        })
    }

    async fn cancel_run(&self, run_id: i64) -> ApiResult<()> {
        self.inner.lock().unwrap().cancelled.push(run_id);
        Ok(())
    }

    async fn delete_job(&self, job_id: i64) -> ApiResult<()> {
        self.inner.lock().unwrap().deleted.push(job_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Workload
// ---------------------------------------------------------------------------

pub struct FakeWorkload {
    pub units: usize,
    pub fail_for: HashSet<String>,
    pub panic_for: HashSet<String>,
    pub abandoned: Mutex<Vec<String>>,
    pub delay: Duration,
    pub invocations: Mutex<Vec<WorkloadInvocation>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeWorkload {
    pub fn new(units: usize) -> Self {
        Self {
            units,
            fail_for: HashSet::new(),
            panic_for: HashSet::new(),
            abandoned: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            invocations: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing_for(mut self, resource_name: &str) -> Self {
        self.fail_for.insert(resource_name.to_string());
        self
    }

    pub fn panicking_for(mut self, resource_name: &str) -> Self {
        self.panic_for.insert(resource_name.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkloadRunner for FakeWorkload {
    fn orchestrator(&self) -> &str {
        "fake"
    }

    async fn run(&self, invocation: &WorkloadInvocation) -> Result<WorkloadOutcome, WorkloadError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        if self.panic_for.contains(&invocation.handle.resource_name) {
            panic!("workload bug for {}", invocation.handle.resource_name);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let started_at = chrono::Utc::now();
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_for.contains(&invocation.handle.resource_name) {
            return Err(WorkloadError::Failed {
                status: "exit status: 1".into(),
                diagnostic: "Database Error in model dim_account".into(),
            });
        }
        let units = (0..self.units)
            .map(|i| UnitResult {
                schema: format!("{}_silver", invocation.schema),
                name: format!("model_{}", i),
                execution_time_seconds: 1.0 + i as f64,
                status: Some("success".into()),
            })
            .collect();
        Ok(WorkloadOutcome {
            units,
            submission_id: None,
            started_at,
            finished_at: chrono::Utc::now(),
        })
    }

    async fn abandon(&self, invocation: &WorkloadInvocation) {
        self.abandoned
            .lock()
            .unwrap()
            .push(invocation.handle.resource_name.clone());
    }
}

// ---------------------------------------------------------------------------
// Audit store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryAudit {
    pub rows: Mutex<Vec<(String, Vec<Value>)>>,
    pub fail_table: Option<&'static str>,
    /// Appends after this many succeed fail.
    pub fail_after: Option<usize>,
    pub appends: AtomicUsize,
}

impl MemoryAudit {
    pub fn failing_on(table: &'static str) -> Self {
        Self {
            fail_table: Some(table),
            ..Self::default()
        }
    }

    pub fn failing_after(appends: usize) -> Self {
        Self {
            fail_after: Some(appends),
            ..Self::default()
        }
    }

    pub fn count(&self, table: &str) -> usize {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == table)
            .count()
    }

    /// `experiment_id` column of every row in `table`.
    pub fn experiment_ids(&self, table: &str) -> Vec<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == table)
            .filter_map(|(_, row)| row.get(1).and_then(Value::render))
            .collect()
    }
}

#[async_trait]
impl AuditStore for MemoryAudit {
    async fn append(&self, table: &TableDef, rows: Vec<Vec<Value>>) -> Result<(), AuditWriteError> {
        if self.fail_table == Some(table.name) {
            return Err(AuditWriteError::new(table.name, "disk full"));
        }
        let done = self.appends.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|n| done >= n) {
            return Err(AuditWriteError::new(table.name, "connection reset"));
        }
        let mut all = self.rows.lock().unwrap();
        for row in rows {
            all.push((table.name.to_string(), row));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub warehouses: FakeWarehouses,
    pub statements: FakeStatements,
    pub workload: Arc<FakeWorkload>,
    pub audit: Arc<MemoryAudit>,
    pub batch_id: BatchId,
}

impl Harness {
    pub fn new(workload: FakeWorkload) -> Self {
        Self::with_audit(workload, MemoryAudit::default())
    }

    pub fn with_audit(workload: FakeWorkload, audit: MemoryAudit) -> Self {
        Self {
            warehouses: FakeWarehouses::new(),
            statements: FakeStatements::new(),
            workload: Arc::new(workload),
            audit: Arc::new(audit),
            batch_id: BatchId::from("batch-test"),
        }
    }

    pub fn lifecycle(&self) -> WarehouseLifecycleManager {
        WarehouseLifecycleManager::new(Arc::new(self.warehouses.clone()), fast_lifecycle())
    }

    pub fn cleanup(&self) -> CleanupCoordinator {
        CleanupCoordinator::new(
            self.lifecycle(),
            Arc::new(self.statements.clone()),
            "tpcdi",
            "dl",
        )
        .with_retry(fast_retry())
    }

    pub fn orchestrator(&self, parallelism: usize) -> ExperimentOrchestrator {
        ExperimentOrchestrator::new(
            self.lifecycle(),
            self.workload.clone(),
            AuditRecorder::new(self.audit.clone()),
            self.cleanup(),
            OrchestratorSettings {
                parallelism,
                catalog: "tpcdi".into(),
                schema_prefix: "dl".into(),
            },
        )
    }
}
