//! Provisioning API: named SQL warehouses.

use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;

use crate::client::WorkspaceClient;
use crate::error::{ApiError, ApiResult};
use crate::types::{
    CreateWarehouseRequest, CreateWarehouseResponse, ListWarehousesResponse, WarehouseInfo,
};

const WAREHOUSES: &str = "/api/2.0/sql/warehouses";

/// Create/get/list/stop/start/delete for named warehouses.
///
/// `create` fails with [`ApiError::AlreadyExists`] when the name is taken.
#[async_trait]
pub trait WarehouseApi: Send + Sync {
    /// Request creation and return the assigned id. Does not wait for readiness.
    async fn create(&self, request: &CreateWarehouseRequest) -> ApiResult<String>;

    async fn get(&self, id: &str) -> ApiResult<WarehouseInfo>;

    async fn list(&self) -> ApiResult<Vec<WarehouseInfo>>;

    async fn stop(&self, id: &str) -> ApiResult<()>;

    async fn start(&self, id: &str) -> ApiResult<()>;

    async fn delete(&self, id: &str) -> ApiResult<()>;

    /// First live warehouse whose name matches exactly.
    async fn find_by_name(&self, name: &str) -> ApiResult<Option<WarehouseInfo>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|w| w.name == name && !w.state.is_some_and(|s| s.is_gone())))
    }
}

/// Ids are interpolated into URL paths; only opaque token characters pass.
pub(crate) fn path_id(id: &str) -> ApiResult<&str> {
    if !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(id)
    } else {
        Err(ApiError::Config {
            message: format!("invalid resource id {:?}", id),
        })
    }
}

#[async_trait]
impl WarehouseApi for WorkspaceClient {
    async fn create(&self, request: &CreateWarehouseRequest) -> ApiResult<String> {
        debug!(name = %request.name, size = %request.cluster_size, "creating warehouse");
        let body = serde_json::to_value(request).map_err(|e| ApiError::Config {
            message: format!("failed to encode create request: {}", e),
        })?;
        let created: CreateWarehouseResponse =
            self.http.json(Method::POST, WAREHOUSES, Some(body), &[]).await?;
        Ok(created.id)
    }

    async fn get(&self, id: &str) -> ApiResult<WarehouseInfo> {
        let path = format!("{}/{}", WAREHOUSES, path_id(id)?);
        self.http.json(Method::GET, &path, None, &[]).await
    }

    async fn list(&self) -> ApiResult<Vec<WarehouseInfo>> {
        let listed: ListWarehousesResponse =
            self.http.json(Method::GET, WAREHOUSES, None, &[]).await?;
        Ok(listed.warehouses)
    }

    async fn stop(&self, id: &str) -> ApiResult<()> {
        let path = format!("{}/{}/stop", WAREHOUSES, path_id(id)?);
        self.http.ack(Method::POST, &path, None).await
    }

    async fn start(&self, id: &str) -> ApiResult<()> {
        let path = format!("{}/{}/start", WAREHOUSES, path_id(id)?);
        self.http.ack(Method::POST, &path, None).await
    }

    async fn delete(&self, id: &str) -> ApiResult<()> {
        let path = format!("{}/{}", WAREHOUSES, path_id(id)?);
        self.http.ack(Method::DELETE, &path, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_id_rejects_traversal() {
        assert!(path_id("1234abcd").is_ok());
        assert!(path_id("../jobs").is_err());
        assert!(path_id("").is_err());
    }
}
