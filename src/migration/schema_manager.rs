//! SchemaManager - the handle migrations use to change the schema

use crate::executor::DbError;
use crate::migration::action::{ColumnType, ForeignKeyDef, IndexDef, SchemaAction, TableDef};
use crate::migration::SchemaTarget;

/// SchemaManager provides the schema operations available to migrations
///
/// Each method builds one [`SchemaAction`] and hands it to the target, so the
/// same migration runs against PostgreSQL, the in-memory catalog or the SQL
/// script writer.
pub struct SchemaManager<'a> {
    target: &'a dyn SchemaTarget,
}

impl<'a> SchemaManager<'a> {
    pub fn new(target: &'a dyn SchemaTarget) -> Self {
        Self { target }
    }

    /// Apply an arbitrary action
    pub fn apply(&self, action: SchemaAction) -> Result<(), DbError> {
        log::debug!("  -> {}", action);
        self.target.apply(&action)
    }

    /// Create a table
    ///
    /// # Example
    /// ```rust,no_run
    /// use scribe::migration::action::{ColumnSpec, ColumnType, TableDef};
    /// # let manager: &scribe::migration::SchemaManager<'_> = todo!();
    ///
    /// let table = TableDef::new("meetings")
    ///     .column(ColumnSpec::serial("id"))
    ///     .column(ColumnSpec::new("start_time", ColumnType::Timestamp { with_time_zone: false }))
    ///     .primary_key(["id"]);
    ///
    /// manager.create_table(table)?;
    /// # Ok::<(), scribe::DbError>(())
    /// ```
    pub fn create_table(&self, table: TableDef) -> Result<(), DbError> {
        self.apply(SchemaAction::CreateTable(table))
    }

    /// Create `table` as a structural copy of `source` (no rows, no foreign keys)
    pub fn create_table_like(&self, table: &str, source: &str) -> Result<(), DbError> {
        self.apply(SchemaAction::CreateTableLike {
            table: table.to_string(),
            source: source.to_string(),
        })
    }

    /// Drop a table
    pub fn drop_table(&self, table: &str) -> Result<(), DbError> {
        self.apply(SchemaAction::DropTable {
            table: table.to_string(),
        })
    }

    /// Change the declared type of a column
    pub fn alter_column_type(
        &self,
        table: &str,
        column: &str,
        column_type: ColumnType,
    ) -> Result<(), DbError> {
        self.apply(SchemaAction::AlterColumnType {
            table: table.to_string(),
            column: column.to_string(),
            column_type,
        })
    }

    /// Add a named foreign key
    pub fn create_foreign_key(&self, fk: ForeignKeyDef) -> Result<(), DbError> {
        self.apply(SchemaAction::AddForeignKey(fk))
    }

    /// Drop a named constraint
    pub fn drop_constraint(&self, table: &str, name: &str) -> Result<(), DbError> {
        self.apply(SchemaAction::DropConstraint {
            table: table.to_string(),
            name: name.to_string(),
        })
    }

    /// Create a named index
    pub fn create_index(&self, index: IndexDef) -> Result<(), DbError> {
        self.apply(SchemaAction::CreateIndex(index))
    }

    /// Drop a named index
    pub fn drop_index(&self, table: &str, name: &str) -> Result<(), DbError> {
        self.apply(SchemaAction::DropIndex {
            table: table.to_string(),
            name: name.to_string(),
        })
    }
}
