//! Guaranteed release of everything one experiment created.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{error, info, warn};
use whsweep_api::{ApiError, StatementApi, StatementRequest};

use crate::errors::CleanupError;
use crate::lifecycle::WarehouseLifecycleManager;
use crate::model::Lease;
use crate::naming;

/// Bounded exponential backoff for drop/delete calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_delay);
        let jitter: f64 = rand::thread_rng().gen_range(0.8_f64..=1.2_f64);
        exp.mul_f64(jitter)
    }

    async fn run<F, Fut, T>(&self, what: &str, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt + 1 < attempts => {
                    let backoff = self.delay(attempt);
                    warn!(
                        what,
                        error = %e,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        "cleanup step failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// What a successful cleanup pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub resource_id: Option<String>,
    pub dropped_schemas: Vec<String>,
    pub released: bool,
}

#[derive(Clone)]
pub struct CleanupCoordinator {
    lifecycle: WarehouseLifecycleManager,
    statements: Arc<dyn StatementApi>,
    catalog: String,
    schema_prefix: String,
    retry: RetryPolicy,
}

impl CleanupCoordinator {
    pub fn new(
        lifecycle: WarehouseLifecycleManager,
        statements: Arc<dyn StatementApi>,
        catalog: impl Into<String>,
        schema_prefix: impl Into<String>,
    ) -> Self {
        Self {
            lifecycle,
            statements,
            catalog: catalog.into(),
            schema_prefix: schema_prefix.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Drop the experiment's namespaces (only an active lease can have
    /// materialized any) and delete its warehouse.
    pub async fn cleanup(&self, lease: &Lease) -> Result<CleanupSummary, CleanupError> {
        let name = lease.resource_name();
        let resolved = self
            .retry
            .run("resolve warehouse id", || self.lifecycle.resolve_id(lease))
            .await;
        let id = match resolved {
            Ok(Some(id)) => id,
            Ok(None) => {
                info!(resource = %name, "nothing to clean up");
                return Ok(CleanupSummary::default());
            }
            Err(e) => {
                error!(resource = %name, error = %e, "could not resolve warehouse for cleanup");
                return Err(CleanupError {
                    resource_name: name.to_string(),
                    resource_id: None,
                    failures: vec![format!("resolve id: {}", e)],
                });
            }
        };

        let base = match lease {
            Lease::Active(_) => match naming::experiment_schema(&self.schema_prefix, &id) {
                Ok(base) => Some(base),
                Err(e) => {
                    return Err(CleanupError {
                        resource_name: name.to_string(),
                        resource_id: Some(id),
                        failures: vec![e.message],
                    });
                }
            },
            Lease::Partial { .. } => None,
        };
        self.cleanup_resource(name, &id, base.as_deref()).await
    }

    /// Drop `base_schema` with its zone variants (when given), then delete
    /// warehouse `id`. Every step is attempted even if an earlier one failed.
    pub async fn cleanup_resource(
        &self,
        name: &str,
        id: &str,
        base_schema: Option<&str>,
    ) -> Result<CleanupSummary, CleanupError> {
        let mut failures = Vec::new();
        let mut dropped = Vec::new();

        if let Some(base) = base_schema {
            for schema in naming::zone_schemas(base) {
                if let Err(e) = naming::validate_identifier("schema", &schema) {
                    failures.push(e.message);
                    continue;
                }
                let request = StatementRequest::new(
                    format!(
                        "DROP SCHEMA IF EXISTS {} CASCADE",
                        naming::qualified(&self.catalog, &schema)
                    ),
                    id,
                );
                let what = format!("drop {}", schema);
                match self
                    .retry
                    .run(&what, || self.statements.execute(&request))
                    .await
                {
                    Ok(_) => dropped.push(schema),
                    Err(e) => failures.push(format!("{}: {}", what, e)),
                }
            }
        }

        let released = match self
            .retry
            .run("delete warehouse", || self.lifecycle.release_id(name, id))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                failures.push(format!("delete {}: {}", id, e));
                false
            }
        };

        if failures.is_empty() {
            info!(resource = %name, id = %id, schemas = dropped.len(), "cleanup complete");
            Ok(CleanupSummary {
                resource_id: Some(id.to_string()),
                dropped_schemas: dropped,
                released,
            })
        } else {
            error!(resource = %name, id = %id, failures = ?failures, "cleanup incomplete, resource needs attention");
            Err(CleanupError {
                resource_name: name.to_string(),
                resource_id: Some(id.to_string()),
                failures,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_is_capped() {
        let policy = RetryPolicy {
            attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert!(policy.delay(0) <= Duration::from_millis(120));
        assert!(policy.delay(1) >= Duration::from_millis(160));
        assert!(policy.delay(10) <= Duration::from_millis(600));
    }

    #[tokio::test]
    async fn run_stops_after_attempts() {
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let counter = std::sync::atomic::AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), ApiError> = policy
            .run("x", move || async move {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(ApiError::Server {
                    status: 500,
                    message: "boom".into(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
