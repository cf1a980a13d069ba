//! Schema fingerprints
//!
//! A fingerprint is the hex SHA-256 of a canonical dump of the schema. Two
//! databases with the same tables, columns, indexes and constraints produce
//! the same fingerprint; rows never take part.

use sha2::{Digest, Sha256};

/// Fingerprint a list of catalog lines
///
/// Lines are sorted first so the result does not depend on the order the
/// catalog returned them in.
pub fn fingerprint_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut sorted: Vec<&str> = lines.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for line in sorted {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Fingerprint any serializable schema description
pub fn fingerprint_value<T: serde::Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
