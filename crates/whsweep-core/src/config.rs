//! Sweep file (`sweep.yaml`) model.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audit::warehouse::DEFAULT_AUDIT_SCHEMA;
use crate::cleanup::RetryPolicy;
use crate::errors::ConfigurationError;
use crate::lifecycle::LifecycleSettings;
use crate::model::{ComputeType, WarehouseSize};
use crate::naming;
use crate::orchestrator::OrchestratorSettings;
use crate::sweep::SweepSpec;
use crate::workload::JobWorkloadSettings;

pub const DEFAULT_CONFIG_FILE: &str = "sweep.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepFile {
    pub catalog: String,

    /// Operator identity; jobs run as this user.
    #[serde(default)]
    pub creator: Option<String>,

    pub sweep: SweepSection,

    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub workload: WorkloadSection,

    #[serde(default)]
    pub audit: AuditSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepSection {
    pub sizes: Vec<WarehouseSize>,
    pub compute_types: Vec<ComputeType>,
    pub threads: Vec<u32>,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_scaling_factor")]
    pub scaling_factor: u32,
}

fn default_iterations() -> u32 {
    1
}

fn default_scaling_factor() -> u32 {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub parallelism: usize,
    pub schema_prefix: String,
    pub auto_stop_mins: u32,
    pub poll_interval_secs: u64,
    pub ready_timeout_secs: u64,
    pub cleanup_attempts: u32,
    pub cleanup_backoff_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let lifecycle = LifecycleSettings::default();
        let retry = RetryPolicy::default();
        Self {
            parallelism: 1,
            schema_prefix: naming::DEFAULT_SCHEMA_PREFIX.to_string(),
            auto_stop_mins: lifecycle.auto_stop_mins,
            poll_interval_secs: lifecycle.poll_interval.as_secs(),
            ready_timeout_secs: lifecycle.ready_timeout.as_secs(),
            cleanup_attempts: retry.attempts,
            cleanup_backoff_secs: retry.base_delay.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    Dbt,
    Job,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkloadSection {
    pub kind: WorkloadKind,
    pub program: PathBuf,
    pub project_dir: Option<PathBuf>,
    pub profiles_dir: Option<PathBuf>,
    pub target: Option<String>,
    pub select: Option<String>,
    pub timeout_secs: Option<u64>,
    pub artifacts_dir: PathBuf,
    pub job: JobWorkloadSettings,
}

impl Default for WorkloadSection {
    fn default() -> Self {
        Self {
            kind: WorkloadKind::Dbt,
            program: PathBuf::from("dbt"),
            project_dir: None,
            profiles_dir: None,
            target: None,
            select: None,
            timeout_secs: None,
            artifacts_dir: PathBuf::from("target/whsweep"),
            job: JobWorkloadSettings::default(),
        }
    }
}

impl WorkloadSection {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Sqlite,
    Warehouse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditSection {
    pub kind: AuditKind,
    /// SQLite file for `kind: sqlite`.
    pub path: PathBuf,
    /// Long-lived warehouse that executes audit writes for `kind: warehouse`.
    pub warehouse_id: Option<String>,
    pub schema: String,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            kind: AuditKind::Sqlite,
            path: PathBuf::from("whsweep-audit.db"),
            warehouse_id: None,
            schema: DEFAULT_AUDIT_SCHEMA.to_string(),
        }
    }
}

impl SweepFile {
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::new(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content).map_err(|e| {
            ConfigurationError::new(format!("{}: {}", path.display(), e.message))
        })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        let file: Self = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigurationError::new(format!("invalid sweep file: {}", e)))?;
        Ok(file)
    }

    /// Checks that do not depend on the sweep's expansion.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        naming::validate_identifier("catalog", &self.catalog)?;
        naming::validate_identifier("schema prefix", &self.settings.schema_prefix)?;
        if self.settings.parallelism == 0 {
            return Err(ConfigurationError::new("settings.parallelism must be at least 1"));
        }
        if self.settings.poll_interval_secs == 0 {
            return Err(ConfigurationError::new("settings.poll_interval_secs must be positive"));
        }
        if self.audit.kind == AuditKind::Warehouse {
            let id = self.audit.warehouse_id.as_deref().ok_or_else(|| {
                ConfigurationError::new("audit.warehouse_id is required for kind: warehouse")
            })?;
            naming::validate_identifier("audit.warehouse_id", id)?;
            naming::validate_identifier("audit.schema", &self.audit.schema)?;
        }
        Ok(())
    }

    pub fn sweep_spec(&self) -> SweepSpec {
        SweepSpec {
            sizes: self.sweep.sizes.clone(),
            compute_types: self.sweep.compute_types.clone(),
            threads: self.sweep.threads.clone(),
            iterations: self.sweep.iterations,
            scaling_factor: self.sweep.scaling_factor,
        }
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            auto_stop_mins: self.settings.auto_stop_mins,
            poll_interval: Duration::from_secs(self.settings.poll_interval_secs),
            ready_timeout: Duration::from_secs(self.settings.ready_timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.settings.cleanup_attempts.max(1),
            base_delay: Duration::from_secs(self.settings.cleanup_backoff_secs),
            ..RetryPolicy::default()
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            parallelism: self.settings.parallelism,
            catalog: self.catalog.clone(),
            schema_prefix: self.settings.schema_prefix.clone(),
        }
    }

    /// Job settings with the operator identity and shared workload options
    /// filled in.
    pub fn job_settings(&self) -> JobWorkloadSettings {
        let mut job = self.workload.job.clone();
        if job.creator.is_none() {
            job.creator = self.creator.clone();
        }
        if job.target.is_none() {
            job.target = self.workload.target.clone();
        }
        if job.select.is_none() {
            job.select = self.workload.select.clone();
        }
        if job.timeout.is_none() {
            job.timeout = self.workload.timeout();
        }
        job
    }
}
