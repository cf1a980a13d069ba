//! Migration: Add timezone info
//! Revision: 2e961e0e3655
//! Revises: 5befe308fa8b
//! Description: Makes meetings.start_time and meetings.end_time timezone-aware

use crate::executor::DbError;
use crate::migration::action::ColumnType;
use crate::migration::{DowngradeHazard, Migration, SchemaManager};

const COLUMNS: [&str; 2] = ["start_time", "end_time"];

pub struct AddTimezoneInfo;

impl Migration for AddTimezoneInfo {
    fn revision(&self) -> &str {
        "2e961e0e3655"
    }

    fn down_revision(&self) -> Option<&str> {
        Some("5befe308fa8b")
    }

    fn description(&self) -> &str {
        "add timezone info"
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        for column in COLUMNS {
            manager.alter_column_type(
                "meetings",
                column,
                ColumnType::Timestamp {
                    with_time_zone: true,
                },
            )?;
        }
        Ok(())
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        for column in COLUMNS {
            manager.alter_column_type(
                "meetings",
                column,
                ColumnType::Timestamp {
                    with_time_zone: false,
                },
            )?;
        }
        Ok(())
    }

    fn downgrade_hazards(&self) -> Vec<DowngradeHazard> {
        COLUMNS
            .into_iter()
            .map(|column| DowngradeHazard::TimestampNarrowing {
                revision: self.revision().to_string(),
                table: "meetings".to_string(),
                column: column.to_string(),
            })
            .collect()
    }
}
