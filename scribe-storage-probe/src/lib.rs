//! Object storage probe
//!
//! Checks whether the audio of a recording session made it into the
//! S3-compatible bucket the transcription service uploads to.

pub mod config;
pub mod error;
pub mod report;
pub mod store;

pub use config::ProbeConfig;
pub use error::ProbeError;
pub use report::{probe, ProbeReport};
pub use store::{ObjectStat, ObjectStore, ObjectSummary, S3ObjectStore};
