//! Migration trait definition

use super::schema_manager::SchemaManager;
use crate::executor::DbError;
use serde::Serialize;
use std::fmt;

/// Direction a step is applied in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "upgrade",
            Direction::Down => "downgrade",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Irreversible effect of running a step's `down()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DowngradeHazard {
    /// The table is dropped together with any rows it holds
    TableDrop { revision: String, table: String },
    /// A `timestamptz` column goes back to a naive `timestamp`; offsets are lost
    TimestampNarrowing {
        revision: String,
        table: String,
        column: String,
    },
}

impl fmt::Display for DowngradeHazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DowngradeHazard::TableDrop { revision, table } => {
                write!(f, "{revision}: drops table '{table}' and every row in it")
            }
            DowngradeHazard::TimestampNarrowing {
                revision,
                table,
                column,
            } => write!(
                f,
                "{revision}: converts '{table}.{column}' to timestamp without time zone, \
                 discarding offsets"
            ),
        }
    }
}

/// Trait that every revision of the schema implements
///
/// The identifiers are static metadata: the revision chain is resolved from
/// them without touching the database.
pub trait Migration: Send + Sync {
    /// Unique revision id
    fn revision(&self) -> &str;

    /// Revision this one builds on (`None` for a root)
    fn down_revision(&self) -> Option<&str>;

    /// Branch labels carried by this revision
    fn branch_labels(&self) -> &[&str] {
        &[]
    }

    /// Revisions that must already be applied before this one
    fn depends_on(&self) -> &[&str] {
        &[]
    }

    /// Human-readable summary
    fn description(&self) -> &str;

    /// Apply the revision
    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError>;

    /// Revert the revision
    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), DbError>;

    /// What `down()` destroys; a non-empty list requires confirmation
    fn downgrade_hazards(&self) -> Vec<DowngradeHazard> {
        Vec::new()
    }
}
