//! Migration-specific error types

use crate::executor::DbError;
use crate::migration::{Direction, DowngradeHazard};
use thiserror::Error;

/// Migration-specific errors
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A referenced revision id is not part of the known history
    #[error("Unknown revision: '{0}'")]
    UnknownRevision(String),

    /// A revision prefix matches more than one revision
    #[error("Revision prefix '{prefix}' is ambiguous; candidates: {}", .candidates.join(", "))]
    AmbiguousRevision { prefix: String, candidates: Vec<String> },

    /// Two steps declare the same revision id
    #[error("Revision '{0}' is declared more than once")]
    DuplicateRevision(String),

    /// The parent links loop back onto themselves
    #[error("Revision history contains a cycle through '{0}'")]
    CyclicHistory(String),

    /// The database is not at the revision the step expects
    #[error(
        "Revision mismatch for '{revision}' ({direction}): expected database at {}, found {}.\n\
         No schema change was made.",
        display_revision(.expected.as_deref()),
        display_revision(.found.as_deref())
    )]
    RevisionMismatch {
        revision: String,
        direction: Direction,
        expected: Option<String>,
        found: Option<String>,
    },

    /// A `depends_on` revision has not been applied yet
    #[error("Revision '{revision}' depends on '{dependency}', which is not applied")]
    UnmetDependency { revision: String, dependency: String },

    /// No path exists between the two revisions
    #[error(
        "No path between {} and {} in the revision history",
        display_revision(.from.as_deref()),
        display_revision(.to.as_deref())
    )]
    DisconnectedHistory { from: Option<String>, to: Option<String> },

    /// More than one branch tip and nothing to pick one
    #[error("Multiple head revisions ({}); specify a branch label or revision", .heads.join(", "))]
    AmbiguousHead { heads: Vec<String> },

    /// The requested command runs in one direction but the plan needs the other
    #[error(
        "'{target}' is not a valid {requested} target from {}",
        display_revision(.current.as_deref())
    )]
    DirectionMismatch {
        requested: Direction,
        target: String,
        current: Option<String>,
    },

    /// The downgrade plan destroys data and was not confirmed
    #[error(
        "Downgrade would lose data and was not confirmed:\n{}\n\
         Re-run with explicit confirmation to proceed.",
        .hazards.iter().map(|h| format!("  - {h}")).collect::<Vec<_>>().join("\n")
    )]
    LossyDowngrade { hazards: Vec<DowngradeHazard> },

    /// The database rejected an action of a step; the step was rolled back
    #[error("Revision '{revision}' failed during {direction}: {source}")]
    DdlExecution {
        revision: String,
        direction: Direction,
        #[source]
        source: DbError,
    },

    /// Migration lock could not be acquired in time
    #[error(
        "Migration lock timeout: {0}\n\
         Another process may be running migrations. If this persists, check for a stuck \
         migration process holding the advisory lock (see pg_locks)."
    )]
    LockTimeout(String),

    /// Bookkeeping query failed (version table, history, lock)
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

fn display_revision(revision: Option<&str>) -> String {
    match revision {
        Some(r) => format!("'{r}'"),
        None => "base".to_string(),
    }
}
