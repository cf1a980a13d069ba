//! # Scribe
//!
//! Versioned schema migrations for the meeting transcription store.
//!
//! The [`migration`] module holds the revision chain and the runner; the
//! [`versions`] module holds the concrete revisions of the `meetings`,
//! `meeting_sessions`, `transcriptions` and `transcription_notes` schema.

pub mod config;
pub mod connection;
pub mod executor;
pub mod migration;
pub mod versions;

pub use config::ScribeConfig;
pub use connection::{connect, ConnectionError};
pub use executor::{DbError, PgExecutor, SqlExecutor};
pub use migration::{Migrator, MigrationError, RevisionChain};
