//! Audit store inside the workspace catalog, written through the
//! statement-execution API.
//!
//! Identifiers are validated and back-quoted; values are always bound as
//! named parameters.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use whsweep_api::{StatementApi, StatementRequest};

use crate::audit::{AuditStore, ColumnKind, TableDef, Value};
use crate::errors::{AuditWriteError, ConfigurationError};
use crate::naming::{self, qualified, quote_identifier};

/// Default schema holding the audit tables.
pub const DEFAULT_AUDIT_SCHEMA: &str = "dbt_tpcdi_audit";

/// Upper bound on bound parameters per INSERT.
const MAX_PARAMS: usize = 250;

pub struct WarehouseAuditStore {
    statements: Arc<dyn StatementApi>,
    warehouse_id: String,
    catalog: String,
    schema: String,
    ensured: Mutex<HashSet<&'static str>>,
}

impl WarehouseAuditStore {
    pub fn new(
        statements: Arc<dyn StatementApi>,
        warehouse_id: impl Into<String>,
        catalog: impl Into<String>,
        schema: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let warehouse_id = warehouse_id.into();
        let catalog = catalog.into();
        let schema = schema.into();
        naming::validate_identifier("audit warehouse id", &warehouse_id)?;
        naming::validate_identifier("catalog", &catalog)?;
        naming::validate_identifier("audit schema", &schema)?;
        Ok(Self {
            statements,
            warehouse_id,
            catalog,
            schema,
            ensured: Mutex::new(HashSet::new()),
        })
    }

    fn table_ref(&self, table: &str) -> String {
        format!("{}.{}", qualified(&self.catalog, &self.schema), quote_identifier(table))
    }

    async fn run(&self, table: &str, request: StatementRequest) -> Result<Vec<String>, AuditWriteError> {
        let request = request.catalog(self.catalog.clone());
        self.statements
            .execute(&request)
            .await
            .map(|r| r.first_column())
            .map_err(|e| AuditWriteError::new(table, e.to_string()))
    }

    async fn ensure_table(&self, table: &TableDef) -> Result<(), AuditWriteError> {
        let mut ensured = self.ensured.lock().await;
        if ensured.contains(table.name) {
            return Ok(());
        }

        self.run(
            table.name,
            StatementRequest::new(
                format!(
                    "CREATE SCHEMA IF NOT EXISTS {}",
                    qualified(&self.catalog, &self.schema)
                ),
                &self.warehouse_id,
            ),
        )
        .await?;

        let defs: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(c.name), sql_type(c.kind)))
            .collect();
        self.run(
            table.name,
            StatementRequest::new(
                format!(
                    "CREATE TABLE IF NOT EXISTS {} ({})",
                    self.table_ref(table.name),
                    defs.join(", ")
                ),
                &self.warehouse_id,
            ),
        )
        .await?;

        let existing: HashSet<String> = self
            .run(
                table.name,
                StatementRequest::new(
                    "SELECT column_name FROM information_schema.columns \
                     WHERE table_schema = :schema AND table_name = :table",
                    &self.warehouse_id,
                )
                .param("schema", &self.schema)
                .param("table", table.name),
            )
            .await?
            .into_iter()
            .map(|c| c.to_lowercase())
            .collect();

        let missing: Vec<String> = table
            .columns
            .iter()
            .filter(|c| !existing.contains(c.name))
            .map(|c| format!("{} {}", quote_identifier(c.name), sql_type(c.kind)))
            .collect();
        if !missing.is_empty() {
            debug!(table = table.name, columns = ?missing, "extending audit table");
            self.run(
                table.name,
                StatementRequest::new(
                    format!(
                        "ALTER TABLE {} ADD COLUMNS ({})",
                        self.table_ref(table.name),
                        missing.join(", ")
                    ),
                    &self.warehouse_id,
                ),
            )
            .await?;
        }

        ensured.insert(table.name);
        Ok(())
    }

    /// Parameterized multi-row INSERT for `rows`.
    pub fn insert_request(&self, table: &TableDef, rows: &[Vec<Value>]) -> StatementRequest {
        let names: Vec<String> = table.columns.iter().map(|c| quote_identifier(c.name)).collect();
        let tuples: Vec<String> = (0..rows.len())
            .map(|r| {
                let markers: Vec<String> = (0..table.columns.len())
                    .map(|c| format!(":r{}c{}", r, c))
                    .collect();
                format!("({})", markers.join(", "))
            })
            .collect();
        let mut request = StatementRequest::new(
            format!(
                "INSERT INTO {} ({}) VALUES {}",
                self.table_ref(table.name),
                names.join(", "),
                tuples.join(", ")
            ),
            &self.warehouse_id,
        );
        for (r, row) in rows.iter().enumerate() {
            for (c, (value, column)) in row.iter().zip(table.columns).enumerate() {
                request = request.typed_param(
                    format!("r{}c{}", r, c),
                    value.render(),
                    sql_type(column.kind),
                );
            }
        }
        request
    }
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Text => "STRING",
        ColumnKind::Integer => "BIGINT",
        ColumnKind::Real => "DOUBLE",
        ColumnKind::Timestamp => "TIMESTAMP",
    }
}

#[async_trait]
impl AuditStore for WarehouseAuditStore {
    async fn append(&self, table: &TableDef, rows: Vec<Vec<Value>>) -> Result<(), AuditWriteError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.ensure_table(table).await?;
        // Each chunk commits on its own; a failure leaves earlier chunks in place.
        let per_statement = (MAX_PARAMS / table.columns.len().max(1)).max(1);
        let mut committed = 0;
        for chunk in rows.chunks(per_statement) {
            self.run(table.name, self.insert_request(table, chunk))
                .await
                .map_err(|e| {
                    AuditWriteError::new(
                        table.name,
                        format!(
                            "{} ({} of {} rows were committed before the failure)",
                            e.message,
                            committed,
                            rows.len()
                        ),
                    )
                })?;
            committed += chunk.len();
        }
        Ok(())
    }
}
