//! Migration: Create transcription notes table
//! Revision: 28b3d11b4fd5
//! Revises: 2e961e0e3655
//! Description: Clones the structure of transcriptions into transcription_notes

use crate::executor::DbError;
use crate::migration::{DowngradeHazard, Migration, SchemaManager};

pub struct CreateTranscriptionNotesTable;

impl Migration for CreateTranscriptionNotesTable {
    fn revision(&self) -> &str {
        "28b3d11b4fd5"
    }

    fn down_revision(&self) -> Option<&str> {
        Some("2e961e0e3655")
    }

    fn description(&self) -> &str {
        "create transcription_notes table"
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        // Copies columns, defaults, the primary key and indexes; foreign keys
        // are not copied. Indexes come out as transcription_notes_<cols>_idx.
        manager.create_table_like("transcription_notes", "transcriptions")
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        manager.drop_table("transcription_notes")
    }

    fn downgrade_hazards(&self) -> Vec<DowngradeHazard> {
        vec![DowngradeHazard::TableDrop {
            revision: self.revision().to_string(),
            table: "transcription_notes".to_string(),
        }]
    }
}
