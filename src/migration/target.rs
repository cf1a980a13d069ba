//! The backend a migration run executes against

use crate::executor::DbError;
use crate::migration::{MigrationRecord, SchemaAction};

/// Everything the runner needs from a database
///
/// Implemented by [`PostgresTarget`](crate::migration::PostgresTarget) for a
/// live connection, [`MemoryTarget`](crate::migration::MemoryTarget) for the
/// in-process catalog and [`SqlScriptTarget`](crate::migration::SqlScriptTarget)
/// for offline SQL generation.
pub trait SchemaTarget {
    /// Create the version and history tables if they are missing
    ///
    /// Called under the run lock, only once there is something to write.
    fn prepare(&self) -> Result<(), DbError>;

    /// Current Revision; `None` when nothing has been applied or the
    /// version table does not exist yet
    fn current_revision(&self) -> Result<Option<String>, DbError>;

    /// Replace the Current Revision (`None` clears it back to base)
    fn stamp(&self, revision: Option<&str>) -> Result<(), DbError>;

    /// Append an applied step to the history
    fn record(&self, record: &MigrationRecord) -> Result<(), DbError>;

    /// Applied steps, oldest first
    fn history(&self) -> Result<Vec<MigrationRecord>, DbError>;

    fn begin(&self) -> Result<(), DbError>;

    fn commit(&self) -> Result<(), DbError>;

    fn rollback(&self) -> Result<(), DbError>;

    /// Execute one schema action
    fn apply(&self, action: &SchemaAction) -> Result<(), DbError>;

    /// Try to take the run-level migration lock without waiting
    fn try_lock(&self) -> Result<bool, DbError>;

    fn unlock(&self) -> Result<(), DbError>;

    /// Hash of the observable schema (tables, columns, indexes, constraints)
    fn fingerprint(&self) -> Result<String, DbError>;
}
