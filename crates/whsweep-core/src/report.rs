//! End-of-sweep summary.

use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::errors::Stage;
use crate::model::{BatchId, ExperimentConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupStatus {
    /// Namespaces dropped and warehouse deleted.
    Clean,
    /// No warehouse carried the resource name.
    NothingToClean,
    /// Cleanup gave up; the warehouse may still be live and billing.
    NeedsAttention { failures: Vec<String> },
    /// The experiment never started.
    NotStarted,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentOutcome {
    pub config: ExperimentConfig,
    pub resource_name: String,
    pub resource_id: Option<String>,
    pub schema: Option<String>,
    pub submission_id: Option<String>,
    pub records_written: usize,
    pub status: OutcomeStatus,
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
    pub cleanup: CleanupStatus,
}

impl ExperimentOutcome {
    /// Outcome of a configuration the sweep never reached.
    pub fn not_started(config: ExperimentConfig) -> Self {
        Self {
            resource_name: config.resource_name(),
            config,
            resource_id: None,
            schema: None,
            submission_id: None,
            records_written: 0,
            status: OutcomeStatus::Cancelled,
            failed_stage: None,
            error: None,
            cleanup: CleanupStatus::NotStarted,
        }
    }

    /// Outcome of an experiment whose task died before reporting. Nothing
    /// is known about its warehouse, so it is flagged for attention.
    pub fn aborted(config: ExperimentConfig) -> Self {
        let resource_name = config.resource_name();
        Self {
            error: Some(format!("experiment task for {} panicked", resource_name)),
            cleanup: CleanupStatus::NeedsAttention {
                failures: vec![format!(
                    "cleanup state unknown; check for a warehouse named {}",
                    resource_name
                )],
            },
            status: OutcomeStatus::Failed,
            ..Self::not_started(config)
        }
    }

    pub fn needs_attention(&self) -> bool {
        matches!(self.cleanup, CleanupStatus::NeedsAttention { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub batch_id: BatchId,
    pub outcomes: Vec<ExperimentOutcome>,
}

impl SweepReport {
    fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(OutcomeStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(OutcomeStatus::Failed)
    }

    pub fn cancelled(&self) -> usize {
        self.count(OutcomeStatus::Cancelled)
    }

    /// Every warehouse id the sweep created or resolved.
    pub fn resource_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| o.resource_id.as_deref())
            .collect()
    }

    /// Identifiers returned by the workload's scheduler, if it has one.
    pub fn submission_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| o.submission_id.as_deref())
            .collect()
    }

    pub fn needs_attention(&self) -> Vec<&ExperimentOutcome> {
        self.outcomes.iter().filter(|o| o.needs_attention()).collect()
    }

    /// Human-readable summary for the terminal.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Batch ID: {}", self.batch_id);
        for o in &self.outcomes {
            let status = match o.status {
                OutcomeStatus::Succeeded => "ok",
                OutcomeStatus::Failed => "FAILED",
                OutcomeStatus::Cancelled => "cancelled",
            };
            let _ = write!(
                out,
                "  {:<9} {:<36} id={} records={}",
                status,
                o.resource_name,
                o.resource_id.as_deref().unwrap_or("-"),
                o.records_written
            );
            if let Some(sub) = &o.submission_id {
                let _ = write!(out, " submitted={}", sub);
            }
            match (o.failed_stage, &o.error) {
                (Some(stage), Some(err)) => {
                    let _ = write!(out, " [{}] {}", stage, err);
                }
                (None, Some(err)) => {
                    let _ = write!(out, " {}", err);
                }
                _ => {}
            }
            let _ = writeln!(out);
        }
        let _ = writeln!(
            out,
            "Summary: {} succeeded, {} failed, {} cancelled (of {})",
            self.succeeded(),
            self.failed(),
            self.cancelled(),
            self.outcomes.len()
        );
        let ids = self.resource_ids();
        if !ids.is_empty() {
            let _ = writeln!(out, "Resource IDs: {}", ids.join(", "));
        }
        let subs = self.submission_ids();
        if !subs.is_empty() {
            let _ = writeln!(out, "Submitted IDs: {}", subs.join(", "));
        }
        let attention = self.needs_attention();
        if !attention.is_empty() {
            let _ = writeln!(out, "NEEDS ATTENTION (may still be billing):");
            for o in attention {
                let _ = writeln!(
                    out,
                    "  {} id={}",
                    o.resource_name,
                    o.resource_id.as_deref().unwrap_or("unknown")
                );
            }
        }
        out
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComputeType, WarehouseSize};

    fn outcome(threads: u32, status: OutcomeStatus, cleanup: CleanupStatus) -> ExperimentOutcome {
        let config = ExperimentConfig {
            size: WarehouseSize::Small,
            compute_type: ComputeType::Pro,
            threads,
            iteration: 1,
            scaling_factor: 10,
        };
        ExperimentOutcome {
            resource_id: Some(format!("wh{}", threads)),
            status,
            cleanup,
            ..ExperimentOutcome::not_started(config)
        }
    }

    #[test]
    fn counts_and_attention() {
        let report = SweepReport {
            batch_id: BatchId::from("batch-1"),
            outcomes: vec![
                outcome(4, OutcomeStatus::Succeeded, CleanupStatus::Clean),
                outcome(
                    8,
                    OutcomeStatus::Failed,
                    CleanupStatus::NeedsAttention {
                        failures: vec!["delete wh8: 500".into()],
                    },
                ),
            ],
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.resource_ids(), vec!["wh4", "wh8"]);
        let text = report.render();
        assert!(text.contains("Batch ID: batch-1"));
        assert!(text.contains("NEEDS ATTENTION"));
        assert!(text.contains("tpcdi-pro-small-8-1 id=wh8"));
    }

    #[test]
    fn json_report_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = SweepReport {
            batch_id: BatchId::from("b"),
            outcomes: vec![outcome(4, OutcomeStatus::Succeeded, CleanupStatus::Clean)],
        };
        report.write_json(&path).unwrap();
        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["batch_id"], "b");
        assert_eq!(v["outcomes"][0]["status"], "succeeded");
        assert_eq!(v["outcomes"][0]["cleanup"]["status"], "clean");
        assert_eq!(v["outcomes"][0]["config"]["size"], "Small");
    }
}
