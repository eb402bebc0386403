use crate::app::ports::AuditStorePort;
use crate::constants::{AUDIT_ERROR_FIELD, AUDIT_STATUS_FIELD};
use crate::error::{PipelineError, Result};
use crate::sync::lock;
use crate::types::{AuditEntry, ValidationStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// A stored audit row together with the time its fields last changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRow {
    #[serde(flatten)]
    pub entry: AuditEntry,
    pub updated_at: DateTime<Utc>,
}

/// Audit table kept in a local SQLite database, keyed by
/// `(partition_key, row_key)`.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
    table: String,
}

impl std::fmt::Debug for SqliteAuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAuditStore")
            .field("table", &self.table)
            .finish()
    }
}

impl SqliteAuditStore {
    pub fn open<P: AsRef<Path>>(db_path: P, table: &str) -> Result<Self> {
        check_table_name(table)?;
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn, table)
    }

    pub fn open_in_memory(table: &str) -> Result<Self> {
        check_table_name(table)?;
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self> {
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                partition_key  TEXT NOT NULL,
                row_key        TEXT NOT NULL,
                {status}       TEXT NOT NULL,
                {error}        TEXT NOT NULL,
                updated_at     TEXT NOT NULL,
                PRIMARY KEY (partition_key, row_key)
            );
            "#,
            status = AUDIT_STATUS_FIELD,
            error = AUDIT_ERROR_FIELD,
        ))?;
        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    /// Insert or replace the row for the entry's key. Writing identical
    /// fields leaves the row, including `updated_at`, untouched.
    pub fn upsert(&self, entry: &AuditEntry) -> Result<()> {
        let conn = lock(&self.conn);
        conn.execute(
            &format!(
                "INSERT INTO {t} (partition_key, row_key, {status}, {error}, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(partition_key, row_key) DO UPDATE SET
                     {status}=excluded.{status},
                     {error}=excluded.{error},
                     updated_at=excluded.updated_at
                 WHERE {t}.{status} <> excluded.{status}
                    OR {t}.{error} <> excluded.{error}",
                t = self.table,
                status = AUDIT_STATUS_FIELD,
                error = AUDIT_ERROR_FIELD,
            ),
            params![
                entry.partition_key,
                entry.row_key,
                entry.status.as_str(),
                entry.error_message,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, partition_key: &str, row_key: &str) -> Result<Option<AuditRow>> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(&format!(
            "{} WHERE partition_key = ?1 AND row_key = ?2",
            self.select_columns()
        ))?;
        let mut rows = stmt.query(params![partition_key, row_key])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_row(row)?)),
            None => Ok(None),
        }
    }

    /// All rows ordered by key, optionally restricted to one partition.
    pub fn list(&self, partition_key: Option<&str>) -> Result<Vec<AuditRow>> {
        let conn = lock(&self.conn);
        let mut sql = self.select_columns();
        if partition_key.is_some() {
            sql.push_str(" WHERE partition_key = ?1");
        }
        sql.push_str(" ORDER BY partition_key, row_key");

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = match partition_key {
            Some(pk) => stmt.query(params![pk])?,
            None => stmt.query([])?,
        };
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(row)?);
        }
        Ok(out)
    }

    fn select_columns(&self) -> String {
        format!(
            "SELECT partition_key, row_key, {}, {}, updated_at FROM {}",
            AUDIT_STATUS_FIELD, AUDIT_ERROR_FIELD, self.table
        )
    }
}

fn check_table_name(table: &str) -> Result<()> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(PipelineError::Config(format!("invalid audit table name '{}'", table)));
    }
    Ok(())
}

fn read_row(row: &Row<'_>) -> Result<AuditRow> {
    let status: String = row.get(2)?;
    let updated_at: String = row.get(4)?;
    let status = ValidationStatus::parse(&status)
        .ok_or_else(|| PipelineError::State(format!("unknown validation status '{}'", status)))?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| PipelineError::State(format!("bad updated_at '{}': {}", updated_at, e)))?
        .with_timezone(&Utc);
    Ok(AuditRow {
        entry: AuditEntry {
            partition_key: row.get(0)?,
            row_key: row.get(1)?,
            status,
            error_message: row.get(3)?,
        },
        updated_at,
    })
}

#[async_trait]
impl AuditStorePort for SqliteAuditStore {
    async fn upsert_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.upsert(entry)
            .map_err(|e| PipelineError::persistence(entry.partition_key.clone(), e))?;
        debug!("Upserted audit row {}/{}", entry.partition_key, entry.row_key);
        Ok(())
    }
}
