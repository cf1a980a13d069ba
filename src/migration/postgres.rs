//! PostgreSQL schema target

use crate::executor::{DbError, SqlExecutor};
use crate::migration::checksum::fingerprint_lines;
use crate::migration::state_table::{bootstrap_statements, HISTORY_TABLE, VERSION_TABLE};
use crate::migration::{MigrationRecord, SchemaAction, SchemaTarget};
use std::time::Duration;

/// Runs migrations against a live PostgreSQL connection
///
/// DDL is transactional in PostgreSQL, so every step's actions, its version
/// stamp and its history row commit or roll back together. The run-level
/// lock is a session advisory lock keyed by `lock_key`.
pub struct PostgresTarget<'a> {
    executor: &'a dyn SqlExecutor,
    lock_key: i64,
    statement_timeout: Option<Duration>,
}

impl<'a> PostgresTarget<'a> {
    pub fn new(executor: &'a dyn SqlExecutor, lock_key: i64) -> Self {
        Self {
            executor,
            lock_key,
            statement_timeout: None,
        }
    }

    /// Cancel any single statement that runs longer than `timeout`
    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Whether `table` is visible on the current `search_path`
    fn relation_exists(&self, table: &str) -> Result<bool, DbError> {
        let row = self
            .executor
            .query_one("SELECT to_regclass($1::text) IS NOT NULL", &[&table])?;
        Ok(row.get::<_, bool>(0))
    }

    fn catalog_lines(&self, query: &str) -> Result<Vec<String>, DbError> {
        let rows = self.executor.query_all(query, &[])?;
        Ok(rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| row.get::<_, Option<String>>(i).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join("|")
            })
            .collect())
    }
}

const COLUMNS_QUERY: &str = r#"
SELECT 'column'::text, table_name::text, column_name::text, data_type::text,
       is_nullable::text, column_default::text
FROM information_schema.columns
WHERE table_schema = current_schema()
  AND table_name::text NOT IN ('scribe_version', 'scribe_migration_history')"#;

const INDEXES_QUERY: &str = r#"
SELECT 'index'::text, tablename::text, indexname::text, indexdef::text
FROM pg_indexes
WHERE schemaname = current_schema()
  AND tablename::text NOT IN ('scribe_version', 'scribe_migration_history')"#;

const CONSTRAINTS_QUERY: &str = r#"
SELECT 'constraint'::text, conrelid::regclass::text, conname::text, pg_get_constraintdef(oid)
FROM pg_constraint
WHERE connamespace = current_schema()::regnamespace
  AND conrelid <> 0
  AND conrelid::regclass::text NOT IN ('scribe_version', 'scribe_migration_history')"#;

impl SchemaTarget for PostgresTarget<'_> {
    fn prepare(&self) -> Result<(), DbError> {
        if let Some(timeout) = self.statement_timeout {
            self.executor.execute(
                &format!("SET statement_timeout = {}", timeout.as_millis()),
                &[],
            )?;
        }
        for statement in bootstrap_statements() {
            self.executor.execute(statement, &[])?;
        }
        Ok(())
    }

    fn current_revision(&self) -> Result<Option<String>, DbError> {
        if !self.relation_exists(VERSION_TABLE)? {
            return Ok(None);
        }
        let rows = self
            .executor
            .query_all(&format!("SELECT version_num FROM {VERSION_TABLE}"), &[])?;
        match rows.as_slice() {
            [] => Ok(None),
            [row] => Ok(Some(row.get::<_, String>(0))),
            _ => Err(DbError::Query(format!(
                "{VERSION_TABLE} holds {} rows; expected at most one",
                rows.len()
            ))),
        }
    }

    fn stamp(&self, revision: Option<&str>) -> Result<(), DbError> {
        self.executor
            .execute(&format!("DELETE FROM {VERSION_TABLE}"), &[])?;
        if let Some(revision) = revision {
            self.executor.execute(
                &format!("INSERT INTO {VERSION_TABLE} (version_num) VALUES ($1)"),
                &[&revision],
            )?;
        }
        Ok(())
    }

    fn record(&self, record: &MigrationRecord) -> Result<(), DbError> {
        let direction = record.direction.as_str();
        self.executor.execute(
            &format!(
                "INSERT INTO {HISTORY_TABLE} (revision, direction, applied_at, execution_time_ms) \
                 VALUES ($1, $2, $3, $4)"
            ),
            &[
                &record.revision,
                &direction,
                &record.applied_at,
                &record.execution_time_ms,
            ],
        )?;
        Ok(())
    }

    fn history(&self) -> Result<Vec<MigrationRecord>, DbError> {
        if !self.relation_exists(HISTORY_TABLE)? {
            return Ok(Vec::new());
        }
        let rows = self.executor.query_all(
            &format!(
                "SELECT revision, direction, applied_at, execution_time_ms \
                 FROM {HISTORY_TABLE} ORDER BY id"
            ),
            &[],
        )?;
        rows.iter().map(MigrationRecord::from_row).collect()
    }

    fn begin(&self) -> Result<(), DbError> {
        self.executor.execute("BEGIN", &[])?;
        Ok(())
    }

    fn commit(&self) -> Result<(), DbError> {
        self.executor.execute("COMMIT", &[])?;
        Ok(())
    }

    fn rollback(&self) -> Result<(), DbError> {
        self.executor.execute("ROLLBACK", &[])?;
        Ok(())
    }

    fn apply(&self, action: &SchemaAction) -> Result<(), DbError> {
        let sql = action.to_sql();
        log::debug!("{}", sql);
        self.executor.execute(&sql, &[])?;
        Ok(())
    }

    fn try_lock(&self) -> Result<bool, DbError> {
        let row = self
            .executor
            .query_one("SELECT pg_try_advisory_lock($1)", &[&self.lock_key])?;
        Ok(row.get::<_, bool>(0))
    }

    fn unlock(&self) -> Result<(), DbError> {
        let row = self
            .executor
            .query_one("SELECT pg_advisory_unlock($1)", &[&self.lock_key])?;
        if !row.get::<_, bool>(0) {
            log::warn!("Advisory lock {} was not held by this session", self.lock_key);
        }
        Ok(())
    }

    fn fingerprint(&self) -> Result<String, DbError> {
        let mut lines = self.catalog_lines(COLUMNS_QUERY)?;
        lines.extend(self.catalog_lines(INDEXES_QUERY)?);
        lines.extend(self.catalog_lines(CONSTRAINTS_QUERY)?);
        Ok(fingerprint_lines(&lines))
    }
}
