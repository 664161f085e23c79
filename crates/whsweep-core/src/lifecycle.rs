//! Create/resolve/restart/delete state machine for one named warehouse.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use whsweep_api::{ApiError, CreateWarehouseRequest, WarehouseApi, WarehouseState};

use crate::errors::ProvisioningError;
use crate::model::{ExperimentConfig, Lease, LifecycleState, WarehouseHandle};
use crate::naming;

/// Fixed topology and polling knobs for every warehouse of a sweep.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub auto_stop_mins: u32,
    pub poll_interval: Duration,
    pub ready_timeout: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            auto_stop_mins: 10,
            poll_interval: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(20 * 60),
        }
    }
}

#[derive(Clone)]
pub struct WarehouseLifecycleManager {
    api: Arc<dyn WarehouseApi>,
    settings: LifecycleSettings,
}

impl WarehouseLifecycleManager {
    pub fn new(api: Arc<dyn WarehouseApi>, settings: LifecycleSettings) -> Self {
        Self { api, settings }
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Provision the warehouse for `config` and wait until it is running.
    ///
    /// A name conflict is resolved by restarting the existing warehouse.
    /// The returned handle is always `Active`.
    pub async fn acquire(
        &self,
        config: &ExperimentConfig,
    ) -> Result<WarehouseHandle, ProvisioningError> {
        let name = config.resource_name();
        naming::validate_identifier("resource name", &name)
            .map_err(|e| ProvisioningError::new(&name, e.message))?;

        let (warehouse_type, serverless) = config.compute_type.api_tier();
        let request = CreateWarehouseRequest {
            name: name.clone(),
            cluster_size: config.size.as_api_str().to_string(),
            warehouse_type,
            enable_serverless_compute: serverless,
            min_num_clusters: 1,
            max_num_clusters: 1,
            auto_stop_mins: self.settings.auto_stop_mins,
        };

        info!(resource = %name, from = %LifecycleState::Absent, to = %LifecycleState::Creating, "warehouse transition");
        let resource_id = match self.api.create(&request).await {
            Ok(id) => id,
            Err(e) if e.is_already_exists() => {
                info!(resource = %name, "name already claimed, resolving existing warehouse");
                return self.recover(config, &name, serverless).await;
            }
            Err(e) => {
                return Err(
                    ProvisioningError::new(&name, "create request failed").with_source(e)
                );
            }
        };

        self.wait_for(&name, &resource_id, WarehouseState::Running)
            .await?;

        // Confirm by name: the id we hold must be the live owner of the name.
        let confirmed = self
            .api
            .find_by_name(&name)
            .await
            .map_err(|e| {
                ProvisioningError::new(&name, "could not re-read warehouse by name")
                    .with_resource_id(&resource_id)
                    .with_source(e)
            })?;
        match confirmed {
            Some(info) if info.id == resource_id => {}
            Some(info) => {
                return Err(ProvisioningError::new(
                    &name,
                    format!("name resolves to warehouse {} instead", info.id),
                )
                .with_resource_id(&resource_id));
            }
            None => {
                return Err(
                    ProvisioningError::new(&name, "warehouse not listed after creation")
                        .with_resource_id(&resource_id),
                );
            }
        }

        info!(resource = %name, id = %resource_id, from = %LifecycleState::Creating, to = %LifecycleState::Active, "warehouse transition");
        Ok(self.handle(config, name, resource_id, serverless))
    }

    /// Recovery edge: `Resolving -> Stopped -> Starting -> Active`.
    async fn recover(
        &self,
        config: &ExperimentConfig,
        name: &str,
        serverless: bool,
    ) -> Result<WarehouseHandle, ProvisioningError> {
        info!(resource = %name, from = %LifecycleState::Absent, to = %LifecycleState::Resolving, "warehouse transition");
        let existing = self
            .api
            .find_by_name(name)
            .await
            .map_err(|e| {
                ProvisioningError::new(name, "listing warehouses failed").with_source(e)
            })?
            .ok_or_else(|| {
                ProvisioningError::new(name, "name is claimed but no live warehouse carries it")
            })?;
        let id = existing.id;

        if existing.state != Some(WarehouseState::Stopped) {
            self.api.stop(&id).await.map_err(|e| {
                ProvisioningError::new(name, "stop failed")
                    .with_resource_id(&id)
                    .with_source(e)
            })?;
            self.wait_for(name, &id, WarehouseState::Stopped).await?;
        }
        info!(resource = %name, id = %id, from = %LifecycleState::Resolving, to = %LifecycleState::Stopped, "warehouse transition");

        self.api.start(&id).await.map_err(|e| {
            ProvisioningError::new(name, "start failed")
                .with_resource_id(&id)
                .with_source(e)
        })?;
        info!(resource = %name, id = %id, from = %LifecycleState::Stopped, to = %LifecycleState::Starting, "warehouse transition");
        self.wait_for(name, &id, WarehouseState::Running).await?;

        info!(resource = %name, id = %id, from = %LifecycleState::Starting, to = %LifecycleState::Active, "warehouse transition");
        Ok(self.handle(config, name.to_string(), id, serverless))
    }

    async fn wait_for(
        &self,
        name: &str,
        id: &str,
        target: WarehouseState,
    ) -> Result<(), ProvisioningError> {
        let started = Instant::now();
        loop {
            let info = self.api.get(id).await.map_err(|e| {
                ProvisioningError::new(name, format!("polling for {:?} failed", target))
                    .with_resource_id(id)
                    .with_source(e)
            })?;
            match info.state {
                Some(state) if state == target => return Ok(()),
                Some(state) if state.is_gone() => {
                    return Err(ProvisioningError::new(
                        name,
                        format!("warehouse entered {:?} while waiting for {:?}", state, target),
                    )
                    .with_resource_id(id));
                }
                state => debug!(resource = %name, id = %id, ?state, "waiting for {:?}", target),
            }
            if started.elapsed() >= self.settings.ready_timeout {
                return Err(ProvisioningError::new(
                    name,
                    format!(
                        "not {:?} after {:?}",
                        target, self.settings.ready_timeout
                    ),
                )
                .with_resource_id(id));
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    fn handle(
        &self,
        config: &ExperimentConfig,
        resource_name: String,
        resource_id: String,
        serverless: bool,
    ) -> WarehouseHandle {
        WarehouseHandle {
            resource_name,
            resource_id,
            state: LifecycleState::Active,
            size: config.size,
            compute_type: config.compute_type,
            serverless,
        }
    }

    /// Id for a lease, looked up by name when `acquire` never returned one.
    pub async fn resolve_id(&self, lease: &Lease) -> Result<Option<String>, ApiError> {
        if let Some(id) = lease.resource_id() {
            return Ok(Some(id.to_string()));
        }
        Ok(self
            .api
            .find_by_name(lease.resource_name())
            .await?
            .map(|info| info.id))
    }

    /// Stop and delete. A warehouse that is already gone is not an error.
    pub async fn release(&self, handle: &WarehouseHandle) -> Result<(), ApiError> {
        self.release_id(&handle.resource_name, &handle.resource_id)
            .await
    }

    pub async fn release_id(&self, name: &str, id: &str) -> Result<(), ApiError> {
        info!(resource = %name, id = %id, from = %LifecycleState::Active, to = %LifecycleState::Stopping, "warehouse transition");
        match self.api.stop(id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(resource = %name, id = %id, "warehouse already gone");
                return Ok(());
            }
            Err(e) => warn!(resource = %name, id = %id, error = %e, "stop failed, deleting anyway"),
        }
        match self.api.delete(id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!(resource = %name, id = %id, "warehouse already gone"),
            Err(e) => return Err(e),
        }
        info!(resource = %name, id = %id, from = %LifecycleState::Stopping, to = %LifecycleState::Absent, "warehouse transition");
        Ok(())
    }
}
