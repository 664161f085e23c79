//! Error taxonomy for one experiment's lifecycle.
//!
//! Only [`ConfigurationError`] may abort a whole sweep, and only before any
//! resource is touched. Every other class is caught per configuration by the
//! orchestrator.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use whsweep_api::ApiError;

/// Malformed sweep input or settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("configuration error: {message}")]
pub struct ConfigurationError {
    pub message: String,
}

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Resource creation failed for a reason other than a name conflict.
///
/// `resource_id` is set when the provisioning API had already assigned an id,
/// so the cleanup pass can delete the half-created warehouse.
#[derive(Debug, thiserror::Error)]
#[error("provisioning {resource_name} failed: {reason}")]
pub struct ProvisioningError {
    pub resource_name: String,
    pub resource_id: Option<String>,
    pub reason: String,
    #[source]
    pub source: Option<ApiError>,
}

impl ProvisioningError {
    pub fn new(resource_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            resource_id: None,
            reason: reason.into(),
            source: None,
        }
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_source(mut self, source: ApiError) -> Self {
        self.source = Some(source);
        self
    }
}

/// The external build/query tool did not complete successfully.
#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    #[error("workload could not be started: {message}")]
    Launch { message: String },

    /// The tool ran and reported failure; `diagnostic` is its own output.
    #[error("workload failed ({status}): {diagnostic}")]
    Failed { status: String, diagnostic: String },

    #[error("workload timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("workload results unreadable: {message}")]
    Results { message: String },

    #[error("workload control plane error: {0}")]
    Api(#[from] ApiError),
}

/// Audit rows could not be persisted. Not retried here.
#[derive(Debug, thiserror::Error)]
#[error("audit write to {table} failed: {message}")]
pub struct AuditWriteError {
    pub table: String,
    pub message: String,
}

impl AuditWriteError {
    pub fn new(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            message: message.into(),
        }
    }
}

/// A namespace drop or warehouse deletion failed after all attempts.
/// The warehouse may still be live and billing.
#[derive(Debug, Clone, thiserror::Error)]
#[error(
    "cleanup of {resource_name} ({}) failed: {}",
    .resource_id.as_deref().unwrap_or("id unknown"),
    .failures.join("; ")
)]
pub struct CleanupError {
    pub resource_name: String,
    pub resource_id: Option<String>,
    pub failures: Vec<String>,
}

/// Any failure of a single experiment.
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error(transparent)]
    Workload(#[from] WorkloadError),

    #[error(transparent)]
    AuditWrite(#[from] AuditWriteError),

    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    /// The operator aborted the sweep while this step was in flight.
    #[error("cancelled by operator during {stage}")]
    Cancelled { stage: Stage },
}

/// Step of the experiment pipeline at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Configuration,
    Provisioning,
    Workload,
    Audit,
    Cleanup,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Configuration => "configuration",
            Self::Provisioning => "provisioning",
            Self::Workload => "workload",
            Self::Audit => "audit",
            Self::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

impl ExperimentError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Configuration(_) => Stage::Configuration,
            Self::Provisioning(_) => Stage::Provisioning,
            Self::Workload(_) => Stage::Workload,
            Self::AuditWrite(_) => Stage::Audit,
            Self::Cleanup(_) => Stage::Cleanup,
            Self::Cancelled { stage } => *stage,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_error_lists_every_failure() {
        let err = CleanupError {
            resource_name: "tpcdi-pro-small-8-1".into(),
            resource_id: Some("wh1".into()),
            failures: vec!["drop dl_wh1_gold: boom".into(), "delete wh1: 500".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("wh1"));
        assert!(msg.contains("drop dl_wh1_gold: boom; delete wh1: 500"));
    }

    #[test]
    fn stage_follows_variant() {
        let err: ExperimentError = WorkloadError::TimedOut {
            after: Duration::from_secs(5),
        }
        .into();
        assert_eq!(err.stage(), Stage::Workload);
        assert!(!err.is_cancellation());

        let err: ExperimentError = AuditWriteError::new("invocations", "disk full").into();
        assert_eq!(err.stage(), Stage::Audit);
        assert_eq!(err.to_string(), "audit write to invocations failed: disk full");

        let err = ExperimentError::Cancelled {
            stage: Stage::Provisioning,
        };
        assert!(err.is_cancellation());
        assert_eq!(err.to_string(), "cancelled by operator during provisioning");
    }
}
