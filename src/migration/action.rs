//! Typed schema actions and their PostgreSQL rendering
//!
//! Every change a migration makes is one [`SchemaAction`]. Targets either
//! render it to DDL ([`SchemaAction::to_sql`]) or interpret it directly (the
//! in-memory catalog).

use sea_query::{
    ColumnDef, Expr, ForeignKey, ForeignKeyAction, ForeignKeyCreateStatement, Index,
    IndexCreateStatement, PostgresQueryBuilder, SchemaStatementBuilder, Table,
};
use serde::Serialize;
use std::fmt;

/// Column types used by the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Integer,
    BigInteger,
    Double,
    Text,
    Varchar(u32),
    Boolean,
    Timestamp { with_time_zone: bool },
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => f.write_str("integer"),
            ColumnType::BigInteger => f.write_str("bigint"),
            ColumnType::Double => f.write_str("double precision"),
            ColumnType::Text => f.write_str("text"),
            ColumnType::Varchar(len) => write!(f, "varchar({len})"),
            ColumnType::Boolean => f.write_str("boolean"),
            ColumnType::Timestamp { with_time_zone: true } => {
                f.write_str("timestamp with time zone")
            }
            ColumnType::Timestamp { with_time_zone: false } => {
                f.write_str("timestamp without time zone")
            }
        }
    }
}

/// `ON DELETE` behaviour of a foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
}

impl ReferentialAction {
    fn to_foreign_key_action(self) -> Option<ForeignKeyAction> {
        match self {
            // Database default, leave the clause out
            ReferentialAction::NoAction => None,
            ReferentialAction::Restrict => Some(ForeignKeyAction::Restrict),
            ReferentialAction::Cascade => Some(ForeignKeyAction::Cascade),
            ReferentialAction::SetNull => Some(ForeignKeyAction::SetNull),
        }
    }
}

/// A column of a table definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    /// Backed by a sequence (`serial`)
    pub serial: bool,
    /// `DEFAULT CURRENT_TIMESTAMP`
    pub default_now: bool,
    pub unique: bool,
}

impl ColumnSpec {
    /// A `NOT NULL` column without default
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            serial: false,
            default_now: false,
            unique: false,
        }
    }

    /// An auto-incrementing integer column
    pub fn serial(name: impl Into<String>) -> Self {
        Self {
            serial: true,
            ..Self::new(name, ColumnType::Integer)
        }
    }

    pub fn null(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_now(mut self) -> Self {
        self.default_now = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn to_column_def(&self) -> ColumnDef {
        let mut def = ColumnDef::new(self.name.clone());
        apply_column_type(&mut def, self.column_type);
        if self.serial {
            def.auto_increment();
        }
        if self.nullable {
            def.null();
        } else {
            def.not_null();
        }
        if self.default_now {
            def.default(Expr::current_timestamp());
        }
        if self.unique {
            def.unique_key();
        }
        def
    }
}

fn apply_column_type(def: &mut ColumnDef, column_type: ColumnType) {
    match column_type {
        ColumnType::Integer => def.integer(),
        ColumnType::BigInteger => def.big_integer(),
        ColumnType::Double => def.double(),
        ColumnType::Text => def.text(),
        ColumnType::Varchar(len) => def.string_len(len),
        ColumnType::Boolean => def.boolean(),
        ColumnType::Timestamp { with_time_zone: true } => def.timestamp_with_time_zone(),
        ColumnType::Timestamp { with_time_zone: false } => def.timestamp(),
    };
}

/// A named foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    pub on_delete: ReferentialAction,
}

impl ForeignKeyDef {
    /// Single-column foreign key with the default `ON DELETE` behaviour
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        ref_table: impl Into<String>,
        ref_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: vec![column.into()],
            ref_table: ref_table.into(),
            ref_columns: vec![ref_column.into()],
            on_delete: ReferentialAction::NoAction,
        }
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    fn to_statement(&self) -> ForeignKeyCreateStatement {
        let mut fk = ForeignKey::create();
        fk.name(self.name.clone())
            .from_tbl(self.table.clone())
            .to_tbl(self.ref_table.clone());
        for column in &self.columns {
            fk.from_col(column.clone());
        }
        for column in &self.ref_columns {
            fk.to_col(column.clone());
        }
        if let Some(action) = self.on_delete.to_foreign_key_action() {
            fk.on_delete(action);
        }
        fk
    }
}

/// A named index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDef {
    /// Non-unique index over the given columns
    pub fn new<C: Into<String>>(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = C>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn to_statement(&self) -> IndexCreateStatement {
        let mut index = Index::create();
        index.name(self.name.clone()).table(self.table.clone());
        for column in &self.columns {
            index.col(column.clone());
        }
        if self.unique {
            index.unique();
        }
        index
    }
}

/// A full table definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key<C: Into<String>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKeyDef) -> Self {
        self.foreign_keys.push(fk);
        self
    }
}

/// One schema-altering action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SchemaAction {
    CreateTable(TableDef),
    /// `CREATE TABLE table (LIKE source INCLUDING ALL)`: columns, defaults,
    /// constraints and indexes, but no rows and no foreign keys
    CreateTableLike { table: String, source: String },
    DropTable { table: String },
    AlterColumnType {
        table: String,
        column: String,
        column_type: ColumnType,
    },
    AddForeignKey(ForeignKeyDef),
    DropConstraint { table: String, name: String },
    CreateIndex(IndexDef),
    DropIndex { table: String, name: String },
}

impl SchemaAction {
    /// Render the action as a PostgreSQL statement
    pub fn to_sql(&self) -> String {
        match self {
            SchemaAction::CreateTable(def) => {
                let mut table = Table::create();
                table.table(def.name.clone());
                for column in &def.columns {
                    let mut column_def = column.to_column_def();
                    table.col(&mut column_def);
                }
                if !def.primary_key.is_empty() {
                    let mut pk = Index::create();
                    for column in &def.primary_key {
                        pk.col(column.clone());
                    }
                    table.primary_key(&mut pk);
                }
                for fk in &def.foreign_keys {
                    let mut fk = fk.to_statement();
                    table.foreign_key(&mut fk);
                }
                table.to_owned().build(PostgresQueryBuilder)
            }
            SchemaAction::CreateTableLike { table, source } => format!(
                "CREATE TABLE {} (LIKE {} INCLUDING ALL)",
                quote_ident(table),
                quote_ident(source)
            ),
            SchemaAction::DropTable { table } => Table::drop()
                .table(table.clone())
                .to_owned()
                .build(PostgresQueryBuilder),
            SchemaAction::AlterColumnType {
                table,
                column,
                column_type,
            } => {
                let mut def = ColumnDef::new(column.clone());
                apply_column_type(&mut def, *column_type);
                Table::alter()
                    .table(table.clone())
                    .modify_column(&mut def)
                    .to_owned()
                    .build(PostgresQueryBuilder)
            }
            SchemaAction::AddForeignKey(fk) => fk.to_statement().build(PostgresQueryBuilder),
            SchemaAction::DropConstraint { table, name } => ForeignKey::drop()
                .name(name.clone())
                .table(table.clone())
                .to_owned()
                .build(PostgresQueryBuilder),
            SchemaAction::CreateIndex(index) => index.to_statement().build(PostgresQueryBuilder),
            SchemaAction::DropIndex { table, name } => Index::drop()
                .name(name.clone())
                .table(table.clone())
                .to_owned()
                .build(PostgresQueryBuilder),
        }
    }

    /// Table the action operates on
    pub fn table(&self) -> &str {
        match self {
            SchemaAction::CreateTable(def) => &def.name,
            SchemaAction::CreateTableLike { table, .. }
            | SchemaAction::DropTable { table }
            | SchemaAction::AlterColumnType { table, .. }
            | SchemaAction::DropConstraint { table, .. }
            | SchemaAction::DropIndex { table, .. } => table,
            SchemaAction::AddForeignKey(fk) => &fk.table,
            SchemaAction::CreateIndex(index) => &index.table,
        }
    }
}

impl fmt::Display for SchemaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaAction::CreateTable(def) => write!(f, "create table {}", def.name),
            SchemaAction::CreateTableLike { table, source } => {
                write!(f, "create table {table} like {source}")
            }
            SchemaAction::DropTable { table } => write!(f, "drop table {table}"),
            SchemaAction::AlterColumnType {
                table,
                column,
                column_type,
            } => write!(f, "alter {table}.{column} type {column_type}"),
            SchemaAction::AddForeignKey(fk) => {
                write!(f, "add foreign key {} on {}", fk.name, fk.table)
            }
            SchemaAction::DropConstraint { table, name } => {
                write!(f, "drop constraint {name} on {table}")
            }
            SchemaAction::CreateIndex(index) => {
                write!(f, "create index {} on {}", index.name, index.table)
            }
            SchemaAction::DropIndex { table, name } => write!(f, "drop index {name} on {table}"),
        }
    }
}

/// Double-quote an identifier the way PostgreSQL expects
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quote a string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
