//! Statement-execution API: run one SQL statement on a warehouse.
//!
//! Values always travel as named parameters (`:name` markers); callers only
//! interpolate identifiers they have validated themselves.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::WorkspaceClient;
use crate::error::{ApiError, ApiResult};
use crate::warehouses::path_id;

const STATEMENTS: &str = "/api/2.0/sql/statements";

/// A named statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementParameter {
    pub name: String,

    /// `None` binds SQL NULL.
    pub value: Option<String>,

    /// SQL type of the parameter (`STRING` when omitted).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

/// Body of `POST /api/2.0/sql/statements`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementRequest {
    pub statement: String,
    pub warehouse_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<StatementParameter>,

    pub wait_timeout: String,
    pub on_wait_timeout: String,
    pub disposition: String,
    pub format: String,
}

impl StatementRequest {
    pub fn new(statement: impl Into<String>, warehouse_id: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            warehouse_id: warehouse_id.into(),
            catalog: None,
            schema: None,
            parameters: Vec::new(),
            wait_timeout: "30s".to_string(),
            on_wait_timeout: "CONTINUE".to_string(),
            disposition: "INLINE".to_string(),
            format: "JSON_ARRAY".to_string(),
        }
    }

    pub fn catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    /// Bind a string parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push(StatementParameter {
            name: name.into(),
            value: Some(value.into()),
            type_name: None,
        });
        self
    }

    /// Bind a parameter with an explicit SQL type; `None` binds NULL.
    pub fn typed_param(
        mut self,
        name: impl Into<String>,
        value: Option<String>,
        type_name: impl Into<String>,
    ) -> Self {
        self.parameters.push(StatementParameter {
            name: name.into(),
            value,
            type_name: Some(type_name.into()),
        });
        self
    }
}

/// Execution state of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Closed,
    #[serde(other)]
    Unknown,
}

impl StatementState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ServiceError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StatementStatus {
    state: StatementState,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ColumnInfo {
    name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ResultSchema {
    #[serde(default)]
    columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ResultManifest {
    #[serde(default)]
    schema: ResultSchema,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ResultChunk {
    #[serde(default)]
    data_array: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    next_chunk_index: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct StatementResponse {
    statement_id: String,
    status: StatementStatus,
    #[serde(default)]
    manifest: Option<ResultManifest>,
    #[serde(default)]
    result: Option<ResultChunk>,
}

/// Rows of a finished statement, all values in their string rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResult {
    pub statement_id: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl StatementResult {
    /// Rows keyed by lower-cased column name.
    pub fn records(&self) -> Vec<HashMap<String, Option<String>>> {
        let names: Vec<String> = self.columns.iter().map(|c| c.to_lowercase()).collect();
        self.rows
            .iter()
            .map(|row| names.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }

    /// Values of the first column.
    pub fn first_column(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|r| r.first().cloned().flatten())
            .collect()
    }
}

/// Runs one statement to completion.
#[async_trait]
pub trait StatementApi: Send + Sync {
    async fn execute(&self, request: &StatementRequest) -> ApiResult<StatementResult>;
}

#[async_trait]
impl StatementApi for WorkspaceClient {
    async fn execute(&self, request: &StatementRequest) -> ApiResult<StatementResult> {
        debug!(warehouse_id = %request.warehouse_id, "executing statement");
        let body = serde_json::to_value(request).map_err(|e| ApiError::Config {
            message: format!("failed to encode statement: {}", e),
        })?;
        let mut response: StatementResponse =
            self.http.json(Method::POST, STATEMENTS, Some(body), &[]).await?;

        let started = Instant::now();
        while !response.status.state.is_terminal() {
            if started.elapsed() > self.max_wait {
                return Err(ApiError::Timeout {
                    what: format!("statement {}", response.statement_id),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            let path = format!("{}/{}", STATEMENTS, path_id(&response.statement_id)?);
            response = self.http.json(Method::GET, &path, None, &[]).await?;
        }

        if response.status.state != StatementState::Succeeded {
            let message = response
                .status
                .error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "no error message".to_string());
            return Err(ApiError::StatementFailed {
                statement_id: response.statement_id,
                state: format!("{:?}", response.status.state).to_uppercase(),
                message,
            });
        }

        let columns = response
            .manifest
            .map(|m| m.schema.columns.into_iter().map(|c| c.name).collect())
            .unwrap_or_default();

        let mut rows = Vec::new();
        let mut chunk = response.result.unwrap_or_default();
        loop {
            rows.extend(chunk.data_array.take().unwrap_or_default());
            let Some(next) = chunk.next_chunk_index else {
                break;
            };
            let path = format!(
                "{}/{}/result/chunks/{}",
                STATEMENTS,
                path_id(&response.statement_id)?,
                next
            );
            chunk = self.http.json(Method::GET, &path, None, &[]).await?;
        }

        Ok(StatementResult {
            statement_id: response.statement_id,
            columns,
            rows,
        })
    }
}
