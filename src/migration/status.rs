//! Migration status reporting

use crate::migration::{Migration, MigrationRecord};

/// A revision as listed by `status`/`history`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionSummary {
    pub revision: String,
    pub down_revision: Option<String>,
    pub description: String,
    pub branch_labels: Vec<String>,
}

impl From<&dyn Migration> for RevisionSummary {
    fn from(migration: &dyn Migration) -> Self {
        Self {
            revision: migration.revision().to_string(),
            down_revision: migration.down_revision().map(str::to_string),
            description: migration.description().to_string(),
            branch_labels: migration.branch_labels().iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Where a database stands relative to the revision chain
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current Revision (`None` = base)
    pub current: Option<String>,

    /// Tips of the chain
    pub heads: Vec<String>,

    /// Revisions on the line from base to the Current Revision, oldest first
    pub applied: Vec<RevisionSummary>,

    /// Revisions between the Current Revision and head, in upgrade order
    pub pending: Vec<RevisionSummary>,

    /// Steps recorded in the history table
    pub history: Vec<MigrationRecord>,

    /// Number of applied revisions
    pub applied_count: usize,

    /// Number of pending revisions
    pub pending_count: usize,
}

impl MigrationStatus {
    #[must_use]
    pub fn new(
        current: Option<String>,
        heads: Vec<String>,
        applied: Vec<RevisionSummary>,
        pending: Vec<RevisionSummary>,
        history: Vec<MigrationRecord>,
    ) -> Self {
        let applied_count = applied.len();
        let pending_count = pending.len();

        Self {
            current,
            heads,
            applied,
            pending,
            history,
            applied_count,
            pending_count,
        }
    }

    /// Check if the database is at head
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count == 0
    }

    /// Next revision an upgrade would apply
    #[must_use]
    pub fn next_pending(&self) -> Option<&str> {
        self.pending.first().map(|m| m.revision.as_str())
    }

    /// Whether the Current Revision is one of the heads
    #[must_use]
    pub fn is_head(&self) -> bool {
        match &self.current {
            Some(current) => self.heads.contains(current),
            None => self.heads.is_empty(),
        }
    }
}
