//! `MigrationRecord` - entries of the `scribe_migration_history` table

use crate::executor::DbError;
use crate::migration::Direction;
use chrono::{DateTime, Utc};

/// One applied step, as appended to the history table
///
/// The history is informational: ordering decisions only ever look at the
/// version table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Revision the step belongs to
    pub revision: String,

    /// Whether `up()` or `down()` ran
    pub direction: Direction,

    /// When the step committed
    pub applied_at: DateTime<Utc>,

    /// Execution time in milliseconds (`None` if not recorded)
    pub execution_time_ms: Option<i64>,
}

impl MigrationRecord {
    #[must_use]
    pub fn new(
        revision: String,
        direction: Direction,
        applied_at: DateTime<Utc>,
        execution_time_ms: Option<i64>,
    ) -> Self {
        Self {
            revision,
            direction,
            applied_at,
            execution_time_ms,
        }
    }

    /// Create a `MigrationRecord` from a database row
    ///
    /// Expected column order: `revision`, `direction`, `applied_at`, `execution_time_ms`
    ///
    /// # Errors
    ///
    /// Returns `DbError::Parse` if the direction column holds an unknown value.
    pub fn from_row(row: &may_postgres::Row) -> Result<Self, DbError> {
        let revision: String = row.get(0);
        let direction: String = row.get(1);
        let applied_at: DateTime<Utc> = row.get(2);
        let execution_time_ms: Option<i64> = row.get(3);

        Ok(Self {
            revision,
            direction: parse_direction(&direction)?,
            applied_at,
            execution_time_ms,
        })
    }
}

pub(crate) fn parse_direction(value: &str) -> Result<Direction, DbError> {
    match value {
        "upgrade" => Ok(Direction::Up),
        "downgrade" => Ok(Direction::Down),
        other => Err(DbError::Parse(format!("unknown migration direction '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direction() {
        assert_eq!(parse_direction("upgrade").unwrap(), Direction::Up);
        assert_eq!(parse_direction(Direction::Down.as_str()).unwrap(), Direction::Down);
        assert!(parse_direction("sideways").is_err());
    }
}
