//! Bookkeeping tables: the Current Revision and the step history

/// Single-row table holding the Current Revision
pub const VERSION_TABLE: &str = "scribe_version";

/// Append-only log of applied steps
pub const HISTORY_TABLE: &str = "scribe_migration_history";

/// `CREATE TABLE` for the version table
///
/// At most one row; no row means the database is at base.
pub const CREATE_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS scribe_version (
    version_num VARCHAR(32) NOT NULL,
    CONSTRAINT scribe_version_pkc PRIMARY KEY (version_num)
)"#;

/// `CREATE TABLE` for the history table
pub const CREATE_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS scribe_migration_history (
    id BIGSERIAL PRIMARY KEY,
    revision VARCHAR(32) NOT NULL,
    direction VARCHAR(16) NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL,
    execution_time_ms BIGINT
)"#;

/// Index on `applied_at` for history listings
pub const CREATE_HISTORY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_scribe_migration_history_applied_at
ON scribe_migration_history(applied_at)"#;

/// Statements that create every bookkeeping table, in order
pub fn bootstrap_statements() -> [&'static str; 3] {
    [CREATE_VERSION_TABLE, CREATE_HISTORY_TABLE, CREATE_HISTORY_INDEX]
}

/// Whether a table belongs to the migration machinery rather than the schema
pub fn is_bookkeeping_table(table: &str) -> bool {
    table == VERSION_TABLE || table == HISTORY_TABLE
}
