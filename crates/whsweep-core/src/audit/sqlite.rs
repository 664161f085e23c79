//! Local audit store backed by SQLite.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::ToSqlOutput;
use rusqlite::{params_from_iter, Connection, ToSql};

use crate::audit::{AuditStore, ColumnKind, TableDef, Value};
use crate::errors::AuditWriteError;

#[derive(Clone)]
pub struct SqliteAuditStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAuditStore {
    pub fn open(path: &Path) -> Result<Self, AuditWriteError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuditWriteError::new(path.display().to_string(), e.to_string()))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| AuditWriteError::new(path.display().to_string(), e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|e| AuditWriteError::new(path.display().to_string(), e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> Result<Self, AuditWriteError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AuditWriteError::new(":memory:", e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Row count of `table`, for reporting and tests.
    pub fn count(&self, table: &str) -> Result<i64, AuditWriteError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AuditWriteError::new(table, "connection lock poisoned"))?;
        conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |r| r.get(0))
            .map_err(|e| AuditWriteError::new(table, e.to_string()))
    }

    /// Column names of `table` in declaration order.
    pub fn columns(&self, table: &str) -> Result<Vec<String>, AuditWriteError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AuditWriteError::new(table, "connection lock poisoned"))?;
        table_columns(&conn, table).map_err(|e| AuditWriteError::new(table, e.to_string()))
    }

    /// Raw access for callers that query the audit tables directly.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, AuditWriteError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AuditWriteError::new("sqlite", "connection lock poisoned"))?;
        f(&conn).map_err(|e| AuditWriteError::new("sqlite", e.to_string()))
    }
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Text | ColumnKind::Timestamp => "TEXT",
        ColumnKind::Integer => "INTEGER",
        ColumnKind::Real => "REAL",
    }
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    rows.collect()
}

/// `CREATE TABLE IF NOT EXISTS`, then add every column an older table lacks.
fn ensure_table(conn: &Connection, table: &TableDef) -> rusqlite::Result<()> {
    let defs: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("{} {}", c.name, sql_type(c.kind)))
        .collect();
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            table.name,
            defs.join(", ")
        ),
        [],
    )?;

    let existing: HashSet<String> = table_columns(conn, table.name)?.into_iter().collect();
    for column in table.columns {
        if !existing.contains(column.name) {
            conn.execute(
                &format!(
                    "ALTER TABLE \"{}\" ADD COLUMN {} {}",
                    table.name,
                    column.name,
                    sql_type(column.kind)
                ),
                [],
            )?;
        }
    }
    Ok(())
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Text(v) => v.to_sql(),
            Value::Integer(v) => v.to_sql(),
            Value::Real(v) => v.to_sql(),
        }
    }
}

fn append_blocking(
    conn: &mut Connection,
    table: &TableDef,
    rows: &[Vec<Value>],
) -> rusqlite::Result<()> {
    ensure_table(conn, table)?;
    let names: Vec<&str> = table.columns.iter().map(|c| c.name).collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        table.name,
        names.join(", "),
        placeholders.join(", ")
    );

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&sql)?;
        for row in rows {
            stmt.execute(params_from_iter(row.iter()))?;
        }
    }
    tx.commit()
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(&self, table: &TableDef, rows: Vec<Vec<Value>>) -> Result<(), AuditWriteError> {
        let conn = Arc::clone(&self.conn);
        let def = *table;
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| AuditWriteError::new(def.name, "connection lock poisoned"))?;
            append_blocking(&mut conn, &def, &rows)
                .map_err(|e| AuditWriteError::new(def.name, e.to_string()))
        })
        .await
        .map_err(|e| AuditWriteError::new(table.name, format!("writer task failed: {}", e)))?
    }
}
