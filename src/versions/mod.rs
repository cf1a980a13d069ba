//! The revisions of the meeting transcription schema
//!
//! ```text
//! 5befe308fa8b  initial schema
//!       |
//! 2e961e0e3655  add timezone info
//!       |
//! 28b3d11b4fd5  create transcription_notes table
//!       |
//! 97848cbe17e9  add cascade deleting of meeting
//! ```

use crate::migration::{Migration, MigrationError, RevisionChain};

pub mod m28b3d11b4fd5_create_transcription_notes_table;
pub mod m2e961e0e3655_add_timezone_info;
pub mod m5befe308fa8b_initial_schema;
pub mod m97848cbe17e9_add_cascade_deleting_of_meeting;

pub use m28b3d11b4fd5_create_transcription_notes_table::CreateTranscriptionNotesTable;
pub use m2e961e0e3655_add_timezone_info::AddTimezoneInfo;
pub use m5befe308fa8b_initial_schema::InitialSchema;
pub use m97848cbe17e9_add_cascade_deleting_of_meeting::AddCascadeDeletingOfMeeting;

/// Revision id of the current head
pub const HEAD: &str = "97848cbe17e9";

/// Every known revision
pub fn all() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(InitialSchema),
        Box::new(AddTimezoneInfo),
        Box::new(CreateTranscriptionNotesTable),
        Box::new(AddCascadeDeletingOfMeeting),
    ]
}

/// The validated chain of every known revision
pub fn chain() -> Result<RevisionChain, MigrationError> {
    RevisionChain::new(all())
}
