//! Offline SQL generation
//!
//! [`SqlScriptTarget`] stands in for a database and records the statements a
//! run would execute, so a plan can be reviewed or handed to a DBA. The
//! Current Revision is tracked locally, starting from what the caller says
//! the database is at.

use crate::executor::DbError;
use crate::migration::action::quote_literal;
use crate::migration::state_table::{bootstrap_statements, HISTORY_TABLE, VERSION_TABLE};
use crate::migration::{MigrationRecord, SchemaAction, SchemaTarget};
use std::cell::RefCell;

#[derive(Debug, Default)]
pub struct SqlScriptTarget {
    current: RefCell<Option<String>>,
    statements: RefCell<Vec<String>>,
}

impl SqlScriptTarget {
    /// Start from `current` (`None`: an unmigrated database)
    pub fn new(current: Option<&str>) -> Self {
        Self {
            current: RefCell::new(current.map(str::to_string)),
            statements: RefCell::new(Vec::new()),
        }
    }

    fn push(&self, statement: impl Into<String>) {
        let mut statement = statement.into().trim().to_string();
        if !statement.ends_with(';') {
            statement.push(';');
        }
        self.statements.borrow_mut().push(statement);
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.borrow().clone()
    }

    /// The whole script, one statement per line
    pub fn script(&self) -> String {
        let mut script = self.statements.borrow().join("\n");
        script.push('\n');
        script
    }
}

impl SchemaTarget for SqlScriptTarget {
    fn prepare(&self) -> Result<(), DbError> {
        for statement in bootstrap_statements() {
            self.push(statement);
        }
        Ok(())
    }

    fn current_revision(&self) -> Result<Option<String>, DbError> {
        Ok(self.current.borrow().clone())
    }

    fn stamp(&self, revision: Option<&str>) -> Result<(), DbError> {
        let previous = self.current.replace(revision.map(str::to_string));
        match (previous.as_deref(), revision) {
            (None, None) => {}
            (None, Some(new)) => self.push(format!(
                "INSERT INTO {VERSION_TABLE} (version_num) VALUES ({})",
                quote_literal(new)
            )),
            (Some(old), Some(new)) => self.push(format!(
                "UPDATE {VERSION_TABLE} SET version_num={} WHERE {VERSION_TABLE}.version_num = {}",
                quote_literal(new),
                quote_literal(old)
            )),
            (Some(old), None) => self.push(format!(
                "DELETE FROM {VERSION_TABLE} WHERE {VERSION_TABLE}.version_num = {}",
                quote_literal(old)
            )),
        }
        Ok(())
    }

    fn record(&self, record: &MigrationRecord) -> Result<(), DbError> {
        self.push(format!(
            "INSERT INTO {HISTORY_TABLE} (revision, direction, applied_at, execution_time_ms) \
             VALUES ({}, {}, now(), NULL)",
            quote_literal(&record.revision),
            quote_literal(record.direction.as_str())
        ));
        Ok(())
    }

    fn history(&self) -> Result<Vec<MigrationRecord>, DbError> {
        Ok(Vec::new())
    }

    fn begin(&self) -> Result<(), DbError> {
        self.push("BEGIN");
        Ok(())
    }

    fn commit(&self) -> Result<(), DbError> {
        self.push("COMMIT");
        Ok(())
    }

    fn rollback(&self) -> Result<(), DbError> {
        self.push("ROLLBACK");
        Ok(())
    }

    fn apply(&self, action: &SchemaAction) -> Result<(), DbError> {
        self.push(action.to_sql());
        Ok(())
    }

    fn try_lock(&self) -> Result<bool, DbError> {
        Ok(true)
    }

    fn unlock(&self) -> Result<(), DbError> {
        Ok(())
    }

    fn fingerprint(&self) -> Result<String, DbError> {
        Err(DbError::Other(
            "schema fingerprint is not available in offline mode".to_string(),
        ))
    }
}
