//! In-memory schema target
//!
//! Interprets [`SchemaAction`]s against an in-process catalog that follows
//! PostgreSQL's rules for the parts the revisions touch: relation names share
//! one namespace, `LIKE ... INCLUDING ALL` copies columns, defaults and
//! indexes (renamed the way PostgreSQL names them) but neither rows nor
//! foreign keys, foreign keys are enforced on insert and delete, and a
//! transaction rolls every change back, version stamp included.
//!
//! Timestamps are stored as ISO-8601 strings. Converting a naive column to
//! `timestamp with time zone` reads its values as UTC.

use crate::executor::DbError;
use crate::migration::action::{ColumnType, ForeignKeyDef, IndexDef, ReferentialAction, TableDef};
use crate::migration::checksum::fingerprint_value;
use crate::migration::{MigrationRecord, SchemaAction, SchemaTarget};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// A table row, keyed by column name
pub type Row = BTreeMap<String, Value>;

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Column default expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ColumnDefault {
    /// `CURRENT_TIMESTAMP`
    Now,
    /// `nextval('<sequence>')`
    NextVal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnState {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<ColumnDefault>,
}

/// What created an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexKind {
    Plain,
    PrimaryKey,
    UniqueConstraint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexState {
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub kind: IndexKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSnapshot {
    pub columns: Vec<ColumnState>,
    pub foreign_keys: BTreeMap<String, ForeignKeyDef>,
}

/// Structure of the catalog without rows; equal snapshots mean equal schemas
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    pub tables: BTreeMap<String, TableSnapshot>,
    pub indexes: BTreeMap<String, IndexState>,
}

#[derive(Debug, Clone)]
struct TableState {
    columns: Vec<ColumnState>,
    foreign_keys: BTreeMap<String, ForeignKeyDef>,
    rows: Vec<Row>,
}

impl TableState {
    fn column(&self, name: &str) -> Option<&ColumnState> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone)]
struct Sequence {
    owner: String,
    last_value: i64,
}

#[derive(Debug, Clone, Default)]
struct Catalog {
    tables: BTreeMap<String, TableState>,
    indexes: BTreeMap<String, IndexState>,
    sequences: BTreeMap<String, Sequence>,
    version: Option<String>,
    history: Vec<MigrationRecord>,
}

fn query_error(message: impl Into<String>) -> DbError {
    DbError::Query(message.into())
}

impl Catalog {
    fn relation_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name) || self.indexes.contains_key(name)
    }

    fn table(&self, name: &str) -> Result<&TableState, DbError> {
        self.tables
            .get(name)
            .ok_or_else(|| query_error(format!("relation \"{name}\" does not exist")))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableState, DbError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| query_error(format!("relation \"{name}\" does not exist")))
    }

    fn require_columns(&self, table: &str, columns: &[String]) -> Result<(), DbError> {
        let state = self.table(table)?;
        for column in columns {
            if state.column(column).is_none() {
                return Err(query_error(format!(
                    "column \"{column}\" of relation \"{table}\" does not exist"
                )));
            }
        }
        Ok(())
    }

    /// `<table>_<cols>_<label>`, with a numeric suffix on collision
    fn choose_relation_name(&self, table: &str, columns: &[String], label: &str) -> String {
        let mut base = table.to_string();
        for column in columns {
            base.push('_');
            base.push_str(column);
        }
        let mut candidate = format!("{base}_{label}");
        let mut n = 0;
        while self.relation_exists(&candidate) {
            n += 1;
            candidate = format!("{base}_{label}{n}");
        }
        candidate
    }

    fn apply(&mut self, action: &SchemaAction) -> Result<(), DbError> {
        match action {
            SchemaAction::CreateTable(def) => self.create_table(def),
            SchemaAction::CreateTableLike { table, source } => {
                self.create_table_like(table, source)
            }
            SchemaAction::DropTable { table } => self.drop_table(table),
            SchemaAction::AlterColumnType {
                table,
                column,
                column_type,
            } => self.alter_column_type(table, column, *column_type),
            SchemaAction::AddForeignKey(fk) => self.add_foreign_key(fk),
            SchemaAction::DropConstraint { table, name } => self.drop_constraint(table, name),
            SchemaAction::CreateIndex(index) => self.create_index(index),
            SchemaAction::DropIndex { name, .. } => self.drop_index(name),
        }
    }

    fn create_table(&mut self, def: &TableDef) -> Result<(), DbError> {
        if self.relation_exists(&def.name) {
            return Err(query_error(format!("relation \"{}\" already exists", def.name)));
        }

        let mut columns: Vec<ColumnState> = Vec::with_capacity(def.columns.len());
        for spec in &def.columns {
            if columns.iter().any(|c| c.name == spec.name) {
                return Err(query_error(format!(
                    "column \"{}\" specified more than once",
                    spec.name
                )));
            }
            let default = if spec.serial {
                let sequence = format!("{}_{}_seq", def.name, spec.name);
                self.sequences.insert(
                    sequence.clone(),
                    Sequence {
                        owner: def.name.clone(),
                        last_value: 0,
                    },
                );
                Some(ColumnDefault::NextVal(sequence))
            } else if spec.default_now {
                Some(ColumnDefault::Now)
            } else {
                None
            };
            columns.push(ColumnState {
                name: spec.name.clone(),
                column_type: spec.column_type,
                nullable: spec.nullable && !def.primary_key.contains(&spec.name),
                default,
            });
        }

        self.tables.insert(
            def.name.clone(),
            TableState {
                columns,
                foreign_keys: BTreeMap::new(),
                rows: Vec::new(),
            },
        );

        if !def.primary_key.is_empty() {
            self.require_columns(&def.name, &def.primary_key)?;
            let name = self.choose_relation_name(&def.name, &[], "pkey");
            self.add_index(
                name,
                IndexState {
                    table: def.name.clone(),
                    columns: def.primary_key.clone(),
                    unique: true,
                    kind: IndexKind::PrimaryKey,
                },
            )?;
        }

        for spec in def.columns.iter().filter(|c| c.unique) {
            let columns = vec![spec.name.clone()];
            let name = self.choose_relation_name(&def.name, &columns, "key");
            self.add_index(
                name,
                IndexState {
                    table: def.name.clone(),
                    columns,
                    unique: true,
                    kind: IndexKind::UniqueConstraint,
                },
            )?;
        }

        for fk in &def.foreign_keys {
            self.add_foreign_key(fk)?;
        }
        Ok(())
    }

    fn create_table_like(&mut self, table: &str, source: &str) -> Result<(), DbError> {
        let columns = self.table(source)?.columns.clone();
        if self.relation_exists(table) {
            return Err(query_error(format!("relation \"{table}\" already exists")));
        }
        self.tables.insert(
            table.to_string(),
            TableState {
                columns,
                foreign_keys: BTreeMap::new(),
                rows: Vec::new(),
            },
        );

        let source_indexes: Vec<IndexState> = self
            .indexes
            .values()
            .filter(|index| index.table == source)
            .cloned()
            .collect();
        for index in source_indexes {
            let name = match index.kind {
                IndexKind::PrimaryKey => self.choose_relation_name(table, &[], "pkey"),
                IndexKind::UniqueConstraint => {
                    self.choose_relation_name(table, &index.columns, "key")
                }
                IndexKind::Plain => self.choose_relation_name(table, &index.columns, "idx"),
            };
            self.add_index(
                name,
                IndexState {
                    table: table.to_string(),
                    ..index
                },
            )?;
        }
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> Result<(), DbError> {
        self.table(table)?;
        let dependent = self.tables.iter().find_map(|(name, state)| {
            state
                .foreign_keys
                .values()
                .find(|fk| fk.ref_table == table && name != table)
        });
        if let Some(fk) = dependent {
            return Err(query_error(format!(
                "cannot drop table {table} because other objects depend on it \
                 (constraint {} on table {})",
                fk.name, fk.table
            )));
        }

        self.indexes.retain(|_, index| index.table != table);
        self.sequences.retain(|_, sequence| sequence.owner != table);
        self.tables.remove(table);
        Ok(())
    }

    fn alter_column_type(
        &mut self,
        table: &str,
        column: &str,
        column_type: ColumnType,
    ) -> Result<(), DbError> {
        let state = self.table_mut(table)?;
        let position = state
            .columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| {
                query_error(format!("column \"{column}\" of relation \"{table}\" does not exist"))
            })?;

        let from = state.columns[position].column_type;
        if let (
            ColumnType::Timestamp { with_time_zone: was_tz },
            ColumnType::Timestamp { with_time_zone: to_tz },
        ) = (from, column_type)
        {
            if was_tz != to_tz {
                for row in &mut state.rows {
                    if let Some(value) = row.get_mut(column) {
                        *value = convert_timestamp(value, to_tz)?;
                    }
                }
            }
        }

        state.columns[position].column_type = column_type;
        Ok(())
    }

    fn add_foreign_key(&mut self, fk: &ForeignKeyDef) -> Result<(), DbError> {
        self.require_columns(&fk.table, &fk.columns)?;
        self.require_columns(&fk.ref_table, &fk.ref_columns)?;
        if fk.columns.len() != fk.ref_columns.len() {
            return Err(query_error(format!(
                "number of referencing and referenced columns for foreign key \"{}\" disagree",
                fk.name
            )));
        }

        let clashes_with_index = self
            .indexes
            .get(&fk.name)
            .is_some_and(|index| index.table == fk.table && index.kind != IndexKind::Plain);
        if clashes_with_index || self.table(&fk.table)?.foreign_keys.contains_key(&fk.name) {
            return Err(query_error(format!(
                "constraint \"{}\" for relation \"{}\" already exists",
                fk.name, fk.table
            )));
        }

        let mut wanted = fk.ref_columns.clone();
        wanted.sort();
        let referenced_unique = self.indexes.values().any(|index| {
            let mut columns = index.columns.clone();
            columns.sort();
            index.table == fk.ref_table && index.unique && columns == wanted
        });
        if !referenced_unique {
            return Err(query_error(format!(
                "there is no unique constraint matching given keys for referenced table \"{}\"",
                fk.ref_table
            )));
        }

        for row in &self.table(&fk.table)?.rows {
            self.check_reference(fk, row)?;
        }

        self.table_mut(&fk.table)?
            .foreign_keys
            .insert(fk.name.clone(), fk.clone());
        Ok(())
    }

    /// The referenced row exists (or the key has a null)
    fn check_reference(&self, fk: &ForeignKeyDef, row: &Row) -> Result<(), DbError> {
        let key = key_of(row, &fk.columns);
        if key.iter().any(Value::is_null) {
            return Ok(());
        }
        let referenced = self.table(&fk.ref_table)?;
        if referenced
            .rows
            .iter()
            .any(|candidate| key_of(candidate, &fk.ref_columns) == key)
        {
            Ok(())
        } else {
            Err(query_error(format!(
                "insert or update on table \"{}\" violates foreign key constraint \"{}\"",
                fk.table, fk.name
            )))
        }
    }

    fn drop_constraint(&mut self, table: &str, name: &str) -> Result<(), DbError> {
        if self.table_mut(table)?.foreign_keys.remove(name).is_some() {
            return Ok(());
        }

        let backing = self
            .indexes
            .get(name)
            .filter(|index| index.table == table && index.kind != IndexKind::Plain)
            .cloned();
        let Some(index) = backing else {
            return Err(query_error(format!(
                "constraint \"{name}\" of relation \"{table}\" does not exist"
            )));
        };

        let mut columns = index.columns.clone();
        columns.sort();
        let dependent = self.tables.values().flat_map(|t| t.foreign_keys.values()).find(|fk| {
            let mut referenced = fk.ref_columns.clone();
            referenced.sort();
            fk.ref_table == table && referenced == columns
        });
        if let Some(fk) = dependent {
            return Err(query_error(format!(
                "cannot drop constraint {name} on table {table} \
                 because constraint {} on table {} depends on it",
                fk.name, fk.table
            )));
        }

        self.indexes.remove(name);
        Ok(())
    }

    fn add_index(&mut self, name: String, index: IndexState) -> Result<(), DbError> {
        if self.relation_exists(&name) {
            return Err(query_error(format!("relation \"{name}\" already exists")));
        }
        self.require_columns(&index.table, &index.columns)?;
        if index.unique {
            let rows = &self.table(&index.table)?.rows;
            for (i, row) in rows.iter().enumerate() {
                let key = key_of(row, &index.columns);
                if key.iter().any(Value::is_null) {
                    continue;
                }
                if rows[..i].iter().any(|other| key_of(other, &index.columns) == key) {
                    return Err(query_error(format!("could not create unique index \"{name}\"")));
                }
            }
        }
        self.indexes.insert(name, index);
        Ok(())
    }

    fn create_index(&mut self, def: &IndexDef) -> Result<(), DbError> {
        self.table(&def.table)?;
        self.add_index(
            def.name.clone(),
            IndexState {
                table: def.table.clone(),
                columns: def.columns.clone(),
                unique: def.unique,
                kind: IndexKind::Plain,
            },
        )
    }

    fn drop_index(&mut self, name: &str) -> Result<(), DbError> {
        let index = self
            .indexes
            .get(name)
            .ok_or_else(|| query_error(format!("index \"{name}\" does not exist")))?;
        if index.kind != IndexKind::Plain {
            return Err(query_error(format!(
                "cannot drop index {name} because constraint {name} on table {} requires it",
                index.table
            )));
        }
        self.indexes.remove(name);
        Ok(())
    }

    fn insert_row(
        &mut self,
        table: &str,
        values: &serde_json::Map<String, Value>,
    ) -> Result<Row, DbError> {
        let columns = self.table(table)?.columns.clone();
        if let Some(unknown) = values.keys().find(|k| !columns.iter().any(|c| &c.name == *k)) {
            return Err(query_error(format!(
                "column \"{unknown}\" of relation \"{table}\" does not exist"
            )));
        }

        let mut row = Row::new();
        for column in &columns {
            let value = match values.get(&column.name) {
                Some(value) => value.clone(),
                None => match &column.default {
                    Some(ColumnDefault::NextVal(sequence)) => {
                        Value::from(self.next_value(sequence)?)
                    }
                    Some(ColumnDefault::Now) => now_value(column.column_type),
                    None => Value::Null,
                },
            };
            if value.is_null() && !column.nullable {
                return Err(query_error(format!(
                    "null value in column \"{}\" of relation \"{table}\" \
                     violates not-null constraint",
                    column.name
                )));
            }
            row.insert(column.name.clone(), value);
        }

        let state = self.table(table)?;
        for (name, index) in self.indexes.iter().filter(|(_, i)| i.table == table && i.unique) {
            let key = key_of(&row, &index.columns);
            if key.iter().any(Value::is_null) {
                continue;
            }
            if state.rows.iter().any(|other| key_of(other, &index.columns) == key) {
                return Err(query_error(format!(
                    "duplicate key value violates unique constraint \"{name}\""
                )));
            }
        }
        for fk in state.foreign_keys.values() {
            self.check_reference(fk, &row)?;
        }

        self.table_mut(table)?.rows.push(row.clone());
        Ok(row)
    }

    fn next_value(&mut self, sequence: &str) -> Result<i64, DbError> {
        let sequence = self
            .sequences
            .get_mut(sequence)
            .ok_or_else(|| query_error(format!("relation \"{sequence}\" does not exist")))?;
        sequence.last_value += 1;
        Ok(sequence.last_value)
    }

    /// Delete rows of `table` whose `columns` equal `key`, following foreign keys
    fn delete_matching(
        &mut self,
        table: &str,
        columns: &[String],
        key: &[Value],
    ) -> Result<usize, DbError> {
        let state = self.table_mut(table)?;
        let (removed, kept): (Vec<Row>, Vec<Row>) = std::mem::take(&mut state.rows)
            .into_iter()
            .partition(|row| key_of(row, columns) == key);
        state.rows = kept;

        let referencing: Vec<ForeignKeyDef> = self
            .tables
            .values()
            .flat_map(|t| t.foreign_keys.values())
            .filter(|fk| fk.ref_table == table)
            .cloned()
            .collect();

        for row in &removed {
            for fk in &referencing {
                let referenced_key = key_of(row, &fk.ref_columns);
                if referenced_key.iter().any(Value::is_null) {
                    continue;
                }
                match fk.on_delete {
                    ReferentialAction::Cascade => {
                        self.delete_matching(&fk.table, &fk.columns, &referenced_key)?;
                    }
                    ReferentialAction::SetNull => {
                        for dependent in &mut self.table_mut(&fk.table)?.rows {
                            if key_of(dependent, &fk.columns) == referenced_key {
                                for column in &fk.columns {
                                    dependent.insert(column.clone(), Value::Null);
                                }
                            }
                        }
                    }
                    ReferentialAction::NoAction | ReferentialAction::Restrict => {
                        let still_referenced = self
                            .table(&fk.table)?
                            .rows
                            .iter()
                            .any(|dependent| key_of(dependent, &fk.columns) == referenced_key);
                        if still_referenced {
                            return Err(query_error(format!(
                                "update or delete on table \"{table}\" violates foreign key \
                                 constraint \"{}\" on table \"{}\"",
                                fk.name, fk.table
                            )));
                        }
                    }
                }
            }
        }

        Ok(removed.len())
    }

    fn snapshot(&self) -> SchemaSnapshot {
        SchemaSnapshot {
            tables: self
                .tables
                .iter()
                .map(|(name, state)| {
                    (
                        name.clone(),
                        TableSnapshot {
                            columns: state.columns.clone(),
                            foreign_keys: state.foreign_keys.clone(),
                        },
                    )
                })
                .collect(),
            indexes: self.indexes.clone(),
        }
    }
}

fn key_of(row: &Row, columns: &[String]) -> Vec<Value> {
    columns
        .iter()
        .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
        .collect()
}

fn now_value(column_type: ColumnType) -> Value {
    let now = Utc::now();
    match column_type {
        ColumnType::Timestamp { with_time_zone: true } => Value::String(now.to_rfc3339()),
        _ => Value::String(now.naive_utc().format(NAIVE_FORMAT).to_string()),
    }
}

fn convert_timestamp(value: &Value, to_tz: bool) -> Result<Value, DbError> {
    let Some(text) = value.as_str() else {
        return Ok(value.clone());
    };
    let invalid = |e: chrono::ParseError| {
        query_error(format!("invalid input syntax for type timestamp: \"{text}\" ({e})"))
    };
    if to_tz {
        let naive = NaiveDateTime::parse_from_str(text, NAIVE_FORMAT).map_err(invalid)?;
        Ok(Value::String(Utc.from_utc_datetime(&naive).to_rfc3339()))
    } else {
        let aware = DateTime::parse_from_rfc3339(text).map_err(invalid)?;
        Ok(Value::String(aware.naive_utc().format(NAIVE_FORMAT).to_string()))
    }
}

/// Schema target backed by an in-process catalog
#[derive(Debug, Default)]
pub struct MemoryTarget {
    catalog: RefCell<Catalog>,
    saved: RefCell<Option<Catalog>>,
    locked: Cell<bool>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on a copy of the catalog and keep the copy only if it succeeds
    fn atomically<T>(
        &self,
        f: impl FnOnce(&mut Catalog) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let mut next = self.catalog.borrow().clone();
        let result = f(&mut next)?;
        *self.catalog.borrow_mut() = next;
        Ok(result)
    }

    pub fn snapshot(&self) -> SchemaSnapshot {
        self.catalog.borrow().snapshot()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.catalog.borrow().tables.contains_key(table)
    }

    /// Names of every index on `table`, sorted
    pub fn index_names(&self, table: &str) -> Vec<String> {
        self.catalog
            .borrow()
            .indexes
            .iter()
            .filter(|(_, index)| index.table == table)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn index(&self, name: &str) -> Option<IndexState> {
        self.catalog.borrow().indexes.get(name).cloned()
    }

    pub fn foreign_key(&self, table: &str, name: &str) -> Option<ForeignKeyDef> {
        self.catalog
            .borrow()
            .tables
            .get(table)
            .and_then(|t| t.foreign_keys.get(name).cloned())
    }

    pub fn column(&self, table: &str, column: &str) -> Option<ColumnState> {
        self.catalog
            .borrow()
            .tables
            .get(table)
            .and_then(|t| t.column(column).cloned())
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    /// Insert one row; omitted columns take their default
    ///
    /// `values` must be a JSON object keyed by column name. Returns the row
    /// as stored, defaults filled in.
    pub fn insert_row(&self, table: &str, values: Value) -> Result<Row, DbError> {
        let Value::Object(values) = values else {
            return Err(DbError::Parse(format!("row for \"{table}\" must be a JSON object")));
        };
        self.atomically(|catalog| catalog.insert_row(table, &values))
    }

    /// `DELETE FROM table WHERE column = value`; returns rows removed from `table`
    pub fn delete_where(&self, table: &str, column: &str, value: Value) -> Result<usize, DbError> {
        let columns = [column.to_string()];
        self.atomically(|catalog| {
            catalog.require_columns(table, &columns)?;
            catalog.delete_matching(table, &columns, &[value])
        })
    }

    pub fn rows(&self, table: &str) -> Result<Vec<Row>, DbError> {
        Ok(self.catalog.borrow().table(table)?.rows.clone())
    }

    pub fn row_count(&self, table: &str) -> Result<usize, DbError> {
        Ok(self.catalog.borrow().table(table)?.rows.len())
    }
}

impl SchemaTarget for MemoryTarget {
    fn prepare(&self) -> Result<(), DbError> {
        Ok(())
    }

    fn current_revision(&self) -> Result<Option<String>, DbError> {
        Ok(self.catalog.borrow().version.clone())
    }

    fn stamp(&self, revision: Option<&str>) -> Result<(), DbError> {
        self.catalog.borrow_mut().version = revision.map(str::to_string);
        Ok(())
    }

    fn record(&self, record: &MigrationRecord) -> Result<(), DbError> {
        self.catalog.borrow_mut().history.push(record.clone());
        Ok(())
    }

    fn history(&self) -> Result<Vec<MigrationRecord>, DbError> {
        Ok(self.catalog.borrow().history.clone())
    }

    fn begin(&self) -> Result<(), DbError> {
        let mut saved = self.saved.borrow_mut();
        if saved.is_some() {
            return Err(query_error("there is already a transaction in progress"));
        }
        *saved = Some(self.catalog.borrow().clone());
        Ok(())
    }

    fn commit(&self) -> Result<(), DbError> {
        self.saved.borrow_mut().take();
        Ok(())
    }

    fn rollback(&self) -> Result<(), DbError> {
        if let Some(saved) = self.saved.borrow_mut().take() {
            *self.catalog.borrow_mut() = saved;
        }
        Ok(())
    }

    fn apply(&self, action: &SchemaAction) -> Result<(), DbError> {
        self.atomically(|catalog| catalog.apply(action))
    }

    fn try_lock(&self) -> Result<bool, DbError> {
        if self.locked.get() {
            return Ok(false);
        }
        self.locked.set(true);
        Ok(true)
    }

    fn unlock(&self) -> Result<(), DbError> {
        self.locked.set(false);
        Ok(())
    }

    fn fingerprint(&self) -> Result<String, DbError> {
        fingerprint_value(&self.snapshot()).map_err(|e| DbError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::action::{ColumnSpec, ForeignKeyDef, IndexDef, TableDef};
    use serde_json::json;

    fn parents_and_children(on_delete: ReferentialAction) -> MemoryTarget {
        let target = MemoryTarget::new();
        target
            .apply(&SchemaAction::CreateTable(
                TableDef::new("parents")
                    .column(ColumnSpec::serial("id"))
                    .primary_key(["id"]),
            ))
            .unwrap();
        target
            .apply(&SchemaAction::CreateTable(
                TableDef::new("children")
                    .column(ColumnSpec::serial("id"))
                    .column(ColumnSpec::new("parent_id", ColumnType::Integer))
                    .column(ColumnSpec::new("tag", ColumnType::Varchar(16)))
                    .primary_key(["id"])
                    .foreign_key(
                        ForeignKeyDef::new(
                            "children_parent_id_fkey",
                            "children",
                            "parent_id",
                            "parents",
                            "id",
                        )
                        .on_delete(on_delete),
                    ),
            ))
            .unwrap();
        target
            .apply(&SchemaAction::CreateIndex(IndexDef::new(
                "ix_children_tag",
                "children",
                ["tag"],
            )))
            .unwrap();
        target
    }

    #[test]
    fn test_like_copies_indexes_with_postgres_names() {
        let target = parents_and_children(ReferentialAction::NoAction);
        target
            .apply(&SchemaAction::CreateTableLike {
                table: "children_copy".to_string(),
                source: "children".to_string(),
            })
            .unwrap();

        assert_eq!(
            target.index_names("children_copy"),
            vec!["children_copy_pkey".to_string(), "children_copy_tag_idx".to_string()]
        );
        assert!(target.foreign_key("children_copy", "children_parent_id_fkey").is_none());
        assert_eq!(target.row_count("children_copy").unwrap(), 0);
        assert_eq!(
            target.column("children_copy", "id").unwrap().default,
            Some(ColumnDefault::NextVal("children_id_seq".to_string()))
        );
    }

    #[test]
    fn test_like_name_collision_gets_suffix() {
        let target = parents_and_children(ReferentialAction::NoAction);
        target
            .apply(&SchemaAction::CreateIndex(IndexDef::new("copy_tag_idx", "parents", ["id"])))
            .unwrap();
        target
            .apply(&SchemaAction::CreateTableLike {
                table: "copy".to_string(),
                source: "children".to_string(),
            })
            .unwrap();
        assert!(target.index("copy_tag_idx1").is_some());
    }

    #[test]
    fn test_restrict_and_cascade_delete() {
        let target = parents_and_children(ReferentialAction::NoAction);
        let parent = target.insert_row("parents", json!({})).unwrap();
        target
            .insert_row("children", json!({"parent_id": parent["id"], "tag": "a"}))
            .unwrap();

        let err = target.delete_where("parents", "id", parent["id"].clone()).unwrap_err();
        assert!(err.to_string().contains("violates foreign key constraint"));
        assert_eq!(target.row_count("parents").unwrap(), 1);
        assert_eq!(target.row_count("children").unwrap(), 1);

        let target = parents_and_children(ReferentialAction::Cascade);
        let parent = target.insert_row("parents", json!({})).unwrap();
        target
            .insert_row("children", json!({"parent_id": parent["id"], "tag": "a"}))
            .unwrap();
        assert_eq!(target.delete_where("parents", "id", parent["id"].clone()).unwrap(), 1);
        assert_eq!(target.row_count("children").unwrap(), 0);
    }

    #[test]
    fn test_foreign_key_enforced_on_insert() {
        let target = parents_and_children(ReferentialAction::NoAction);
        let err = target
            .insert_row("children", json!({"parent_id": 42, "tag": "a"}))
            .unwrap_err();
        assert!(err.to_string().contains("children_parent_id_fkey"));
    }

    #[test]
    fn test_constraint_backed_index_cannot_be_dropped_directly() {
        let target = parents_and_children(ReferentialAction::NoAction);
        let err = target
            .apply(&SchemaAction::DropIndex {
                table: "parents".to_string(),
                name: "parents_pkey".to_string(),
            })
            .unwrap_err();
        assert!(err.to_string().contains("requires it"));
    }

    #[test]
    fn test_drop_referenced_table_fails() {
        let target = parents_and_children(ReferentialAction::NoAction);
        let before = target.snapshot();
        let err = target
            .apply(&SchemaAction::DropTable {
                table: "parents".to_string(),
            })
            .unwrap_err();
        assert!(err.to_string().contains("other objects depend on it"));
        assert_eq!(target.snapshot(), before);
    }

    #[test]
    fn test_rollback_restores_catalog_and_version() {
        let target = parents_and_children(ReferentialAction::NoAction);
        let before = target.fingerprint().unwrap();

        target.begin().unwrap();
        target.stamp(Some("aaa111")).unwrap();
        target
            .apply(&SchemaAction::DropIndex {
                table: "children".to_string(),
                name: "ix_children_tag".to_string(),
            })
            .unwrap();
        assert_ne!(target.fingerprint().unwrap(), before);
        target.rollback().unwrap();

        assert_eq!(target.fingerprint().unwrap(), before);
        assert_eq!(target.current_revision().unwrap(), None);
    }

    #[test]
    fn test_timestamp_conversion() {
        let naive = Value::String("2024-05-01T08:00:00".to_string());
        assert_eq!(
            convert_timestamp(&naive, true).unwrap(),
            Value::String("2024-05-01T08:00:00+00:00".to_string())
        );
        let aware = Value::String("2024-05-01T10:00:00+02:00".to_string());
        assert_eq!(
            convert_timestamp(&aware, false).unwrap(),
            Value::String("2024-05-01T08:00:00".to_string())
        );
        assert_eq!(convert_timestamp(&Value::Null, true).unwrap(), Value::Null);
    }

    #[test]
    fn test_lock_is_exclusive() {
        let target = MemoryTarget::new();
        assert!(target.try_lock().unwrap());
        assert!(!target.try_lock().unwrap());
        target.unlock().unwrap();
        assert!(target.try_lock().unwrap());
    }
}
