use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use whsweep_api::WarehouseType;

use crate::errors::ConfigurationError;
use crate::naming;

/// Warehouse size ladder accepted by the provisioning API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WarehouseSize {
    XXSmall,
    XSmall,
    Small,
    Medium,
    Large,
    XLarge,
    XXLarge,
    XXXLarge,
    XXXXLarge,
}

impl WarehouseSize {
    pub const ALL: [WarehouseSize; 9] = [
        Self::XXSmall,
        Self::XSmall,
        Self::Small,
        Self::Medium,
        Self::Large,
        Self::XLarge,
        Self::XXLarge,
        Self::XXXLarge,
        Self::XXXXLarge,
    ];

    /// The `cluster_size` string the provisioning API expects.
    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::XXSmall => "2X-Small",
            Self::XSmall => "X-Small",
            Self::Small => "Small",
            Self::Medium => "Medium",
            Self::Large => "Large",
            Self::XLarge => "X-Large",
            Self::XXLarge => "2X-Large",
            Self::XXXLarge => "3X-Large",
            Self::XXXXLarge => "4X-Large",
        }
    }
}

impl fmt::Display for WarehouseSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

impl FromStr for WarehouseSize {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|size| size.as_api_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|s| s.as_api_str()).collect();
                ConfigurationError::new(format!(
                    "unknown warehouse size {:?} (expected one of: {})",
                    s,
                    known.join(", ")
                ))
            })
    }
}

impl TryFrom<String> for WarehouseSize {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WarehouseSize> for String {
    fn from(value: WarehouseSize) -> Self {
        value.as_api_str().to_string()
    }
}

/// Compute tier as configured by the operator.
///
/// `Serverless` is not a tier at the API level: it maps to `PRO` plus the
/// serverless-enablement flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ComputeType {
    Serverless,
    Pro,
    Classic,
}

impl ComputeType {
    pub const ALL: [ComputeType; 3] = [Self::Serverless, Self::Pro, Self::Classic];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serverless => "SERVERLESS",
            Self::Pro => "PRO",
            Self::Classic => "CLASSIC",
        }
    }

    /// Tier and serverless flag sent to the provisioning API.
    pub fn api_tier(self) -> (WarehouseType, bool) {
        match self {
            Self::Serverless => (WarehouseType::Pro, true),
            Self::Pro => (WarehouseType::Pro, false),
            Self::Classic => (WarehouseType::Classic, false),
        }
    }
}

impl fmt::Display for ComputeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComputeType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                ConfigurationError::new(format!(
                    "unknown compute type {:?} (expected SERVERLESS, PRO or CLASSIC)",
                    s
                ))
            })
    }
}

impl TryFrom<String> for ComputeType {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ComputeType> for String {
    fn from(value: ComputeType) -> Self {
        value.as_str().to_string()
    }
}

/// One cell of the sweep. Immutable once generated; the tuple is its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub size: WarehouseSize,
    pub compute_type: ComputeType,
    pub threads: u32,
    pub iteration: u32,
    pub scaling_factor: u32,
}

impl ExperimentConfig {
    /// Deterministic resource name, also the natural key for idempotent lookup.
    pub fn resource_name(&self) -> String {
        naming::resource_name(self)
    }
}

impl fmt::Display for ExperimentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size={} compute={} threads={} iteration={} sf={}",
            self.size, self.compute_type, self.threads, self.iteration, self.scaling_factor
        )
    }
}

/// Correlation token for one orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BatchId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a resource in the lifecycle state machine.
///
/// Normal path: `Absent -> Creating -> Active -> Stopping -> Absent`.
/// Recovery path: `Absent (name claimed) -> Resolving -> Stopped -> Starting -> Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Absent,
    Creating,
    Active,
    Stopping,
    Resolving,
    Stopped,
    Starting,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "ABSENT",
            Self::Creating => "CREATING",
            Self::Active => "ACTIVE",
            Self::Stopping => "STOPPING",
            Self::Resolving => "RESOLVING",
            Self::Stopped => "STOPPED",
            Self::Starting => "STARTING",
        };
        f.write_str(s)
    }
}

/// A provisioned warehouse, owned by one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseHandle {
    pub resource_name: String,
    pub resource_id: String,
    pub state: LifecycleState,
    pub size: WarehouseSize,
    pub compute_type: ComputeType,
    pub serverless: bool,
}

/// What an experiment holds when it reaches cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lease {
    /// `acquire` returned a handle.
    Active(WarehouseHandle),
    /// `acquire` failed or was abandoned; the id is known only if the
    /// provisioning API had assigned one.
    Partial {
        resource_name: String,
        resource_id: Option<String>,
    },
}

impl Lease {
    pub fn resource_name(&self) -> &str {
        match self {
            Self::Active(h) => &h.resource_name,
            Self::Partial { resource_name, .. } => resource_name,
        }
    }

    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Self::Active(h) => Some(&h.resource_id),
            Self::Partial { resource_id, .. } => resource_id.as_deref(),
        }
    }
}

/// One unit of work reported by the workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResult {
    pub schema: String,
    pub name: String,
    pub execution_time_seconds: f64,
    #[serde(default)]
    pub status: Option<String>,
}

/// Everything a finished workload invocation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadOutcome {
    pub units: Vec<UnitResult>,
    /// Identifier of the submission on the scheduling side, if any.
    #[serde(default)]
    pub submission_id: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

/// Append-only audit row: one unit of measured work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub batch_id: BatchId,
    pub experiment_id: String,
    pub size: WarehouseSize,
    pub compute_type: ComputeType,
    pub threads: u32,
    pub schema_name: String,
    pub model_name: String,
    pub execution_time_seconds: f64,
    pub scaling_factor: u32,
    pub zone: Option<String>,
    pub status: Option<String>,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// Append-only audit row: which orchestrator-level run produced the units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub batch_id: BatchId,
    pub experiment_id: String,
    pub resource_name: String,
    pub size: WarehouseSize,
    pub compute_type: ComputeType,
    pub threads: u32,
    pub iteration: u32,
    pub scaling_factor: u32,
    pub orchestrator: String,
    pub submission_id: Option<String>,
    pub unit_count: u32,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}
