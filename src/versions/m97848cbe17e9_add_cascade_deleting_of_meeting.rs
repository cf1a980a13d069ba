//! Migration: Add cascade deleting of meeting
//! Revision: 97848cbe17e9
//! Revises: 28b3d11b4fd5
//! Description: Deleting a meeting removes its sessions, transcriptions and notes;
//! transcription_notes gets the ix_* index naming used by transcriptions

use crate::executor::DbError;
use crate::migration::action::{ForeignKeyDef, IndexDef, ReferentialAction};
use crate::migration::{Migration, SchemaManager};

const NOTES: &str = "transcription_notes";

fn meeting_fk(name: &str, table: &str) -> ForeignKeyDef {
    ForeignKeyDef::new(name, table, "meeting_id", "meetings", "id")
}

pub struct AddCascadeDeletingOfMeeting;

impl Migration for AddCascadeDeletingOfMeeting {
    fn revision(&self) -> &str {
        "97848cbe17e9"
    }

    fn down_revision(&self) -> Option<&str> {
        Some("28b3d11b4fd5")
    }

    fn description(&self) -> &str {
        "add cascade deleting of meeting"
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        manager.drop_constraint("meeting_sessions", "meeting_sessions_meeting_id_fkey")?;
        manager.create_foreign_key(
            meeting_fk("meeting_sessions_meeting_id_fkey", "meeting_sessions")
                .on_delete(ReferentialAction::Cascade),
        )?;

        manager.drop_index(NOTES, "transcription_notes_id_idx")?;
        manager.drop_index(NOTES, "transcription_notes_meeting_id_idx")?;
        manager.drop_index(NOTES, "transcription_notes_meeting_id_start_time_idx")?;
        manager.drop_index(NOTES, "transcription_notes_session_uid_idx")?;
        manager.create_index(IndexDef::new("ix_transcription_notes_id", NOTES, ["id"]))?;
        manager.create_index(IndexDef::new(
            "ix_transcription_notes_meeting_id",
            NOTES,
            ["meeting_id"],
        ))?;
        manager.create_index(IndexDef::new(
            "ix_transcription_notes_session_uid",
            NOTES,
            ["session_uid"],
        ))?;
        manager.create_foreign_key(
            meeting_fk("transcription_notes_meeting_id_fkey", NOTES)
                .on_delete(ReferentialAction::Cascade),
        )?;

        manager.drop_constraint("transcriptions", "transcriptions_meeting_id_fkey")?;
        manager.create_foreign_key(
            meeting_fk("transcriptions_meeting_id_fkey", "transcriptions")
                .on_delete(ReferentialAction::Cascade),
        )?;

        Ok(())
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        manager.drop_constraint("transcriptions", "transcriptions_meeting_id_fkey")?;
        manager.create_foreign_key(meeting_fk("transcriptions_meeting_id_fkey", "transcriptions"))?;

        manager.drop_constraint(NOTES, "transcription_notes_meeting_id_fkey")?;
        manager.drop_index(NOTES, "ix_transcription_notes_session_uid")?;
        manager.drop_index(NOTES, "ix_transcription_notes_meeting_id")?;
        manager.drop_index(NOTES, "ix_transcription_notes_id")?;
        manager.create_index(IndexDef::new(
            "transcription_notes_session_uid_idx",
            NOTES,
            ["session_uid"],
        ))?;
        manager.create_index(IndexDef::new(
            "transcription_notes_meeting_id_start_time_idx",
            NOTES,
            ["meeting_id", "start_time"],
        ))?;
        manager.create_index(IndexDef::new(
            "transcription_notes_meeting_id_idx",
            NOTES,
            ["meeting_id"],
        ))?;
        manager.create_index(IndexDef::new("transcription_notes_id_idx", NOTES, ["id"]))?;

        manager.drop_constraint("meeting_sessions", "meeting_sessions_meeting_id_fkey")?;
        manager.create_foreign_key(meeting_fk(
            "meeting_sessions_meeting_id_fkey",
            "meeting_sessions",
        ))?;

        Ok(())
    }
}
