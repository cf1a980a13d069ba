//! Run-level migration lock
//!
//! Only one runner may touch the schema and the version table at a time.
//! The guard polls [`SchemaTarget::try_lock`] (a session advisory lock on
//! PostgreSQL) until it succeeds or the timeout expires, and releases the
//! lock when dropped.

use crate::migration::{MigrationError, SchemaTarget};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lock guard that releases the migration lock when dropped
pub struct MigrationLockGuard<'a> {
    target: &'a dyn SchemaTarget,
}

impl<'a> MigrationLockGuard<'a> {
    /// Acquire the migration lock, waiting at most `timeout_seconds` (default: 60)
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockTimeout` if the lock cannot be acquired in time,
    /// or `MigrationError::Database` if the lock query itself fails.
    pub fn new(
        target: &'a dyn SchemaTarget,
        timeout_seconds: Option<u64>,
    ) -> Result<Self, MigrationError> {
        acquire_migration_lock(target, timeout_seconds.unwrap_or(60))?;
        Ok(Self { target })
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        // Can't propagate from drop; the session ending releases it anyway
        if let Err(e) = self.target.unlock() {
            log::warn!("Failed to release migration lock: {}", e);
        }
    }
}

/// Poll until the lock is held or `timeout_seconds` elapse
pub fn acquire_migration_lock(
    target: &dyn SchemaTarget,
    timeout_seconds: u64,
) -> Result<(), MigrationError> {
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_seconds);
    let mut announced = false;

    loop {
        if target.try_lock()? {
            log::debug!("Migration lock acquired after {:?}", start.elapsed());
            return Ok(());
        }

        if start.elapsed() >= timeout {
            return Err(MigrationError::LockTimeout(format!(
                "Failed to acquire migration lock within {} seconds",
                timeout_seconds
            )));
        }

        if !announced {
            log::warn!(
                "Migration lock is held by another process, waiting up to {}s",
                timeout_seconds
            );
            announced = true;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
