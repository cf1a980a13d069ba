//! Migration: Initial schema
//! Revision: 5befe308fa8b
//! Revises: (root)
//! Description: Creates meetings, meeting_sessions and transcriptions

use crate::executor::DbError;
use crate::migration::action::{ColumnSpec, ColumnType, ForeignKeyDef, IndexDef, TableDef};
use crate::migration::{DowngradeHazard, Migration, SchemaManager};

const NAIVE_TIMESTAMP: ColumnType = ColumnType::Timestamp {
    with_time_zone: false,
};

pub struct InitialSchema;

impl Migration for InitialSchema {
    fn revision(&self) -> &str {
        "5befe308fa8b"
    }

    fn down_revision(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> &str {
        "initial schema"
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        manager.create_table(
            TableDef::new("meetings")
                .column(ColumnSpec::serial("id"))
                .column(ColumnSpec::new("title", ColumnType::Varchar(255)).null())
                .column(ColumnSpec::new("start_time", NAIVE_TIMESTAMP))
                .column(ColumnSpec::new("end_time", NAIVE_TIMESTAMP).null())
                .column(ColumnSpec::new("created_at", NAIVE_TIMESTAMP).default_now())
                .primary_key(["id"]),
        )?;

        manager.create_table(
            TableDef::new("meeting_sessions")
                .column(ColumnSpec::serial("id"))
                .column(ColumnSpec::new("meeting_id", ColumnType::Integer))
                .column(ColumnSpec::new("session_uid", ColumnType::Varchar(64)).unique())
                .column(ColumnSpec::new("started_at", NAIVE_TIMESTAMP).default_now())
                .column(ColumnSpec::new("ended_at", NAIVE_TIMESTAMP).null())
                .primary_key(["id"])
                .foreign_key(ForeignKeyDef::new(
                    "meeting_sessions_meeting_id_fkey",
                    "meeting_sessions",
                    "meeting_id",
                    "meetings",
                    "id",
                )),
        )?;

        manager.create_table(
            TableDef::new("transcriptions")
                .column(ColumnSpec::serial("id"))
                .column(ColumnSpec::new("meeting_id", ColumnType::Integer))
                .column(ColumnSpec::new("session_uid", ColumnType::Varchar(64)))
                .column(ColumnSpec::new("speaker", ColumnType::Varchar(255)).null())
                .column(ColumnSpec::new("text", ColumnType::Text))
                .column(ColumnSpec::new("start_time", ColumnType::Double))
                .column(ColumnSpec::new("end_time", ColumnType::Double))
                .column(ColumnSpec::new("created_at", NAIVE_TIMESTAMP).default_now())
                .primary_key(["id"])
                .foreign_key(ForeignKeyDef::new(
                    "transcriptions_meeting_id_fkey",
                    "transcriptions",
                    "meeting_id",
                    "meetings",
                    "id",
                )),
        )?;

        manager.create_index(IndexDef::new("ix_transcriptions_id", "transcriptions", ["id"]))?;
        manager.create_index(IndexDef::new(
            "ix_transcriptions_meeting_id",
            "transcriptions",
            ["meeting_id"],
        ))?;
        manager.create_index(IndexDef::new(
            "ix_transcriptions_session_uid",
            "transcriptions",
            ["session_uid"],
        ))?;
        manager.create_index(IndexDef::new(
            "ix_transcriptions_meeting_id_start_time",
            "transcriptions",
            ["meeting_id", "start_time"],
        ))?;

        Ok(())
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        manager.drop_table("transcriptions")?;
        manager.drop_table("meeting_sessions")?;
        manager.drop_table("meetings")?;
        Ok(())
    }

    fn downgrade_hazards(&self) -> Vec<DowngradeHazard> {
        ["transcriptions", "meeting_sessions", "meetings"]
            .into_iter()
            .map(|table| DowngradeHazard::TableDrop {
                revision: self.revision().to_string(),
                table: table.to_string(),
            })
            .collect()
    }
}
