//! Scribe migration CLI library
//!
//! Exposes the pieces of the CLI that do not need a database connection so they
//! can be tested directly.

pub mod render;
pub mod settings;
