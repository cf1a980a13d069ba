//! Resolution of the runner settings from flags, environment and config file

use scribe::ScribeConfig;
use std::time::Duration;

/// Environment variable checked before `DATABASE_URL`
pub const DATABASE_URL_ENV: &str = "SCRIBE_DATABASE_URL";

/// Pick the database URL: flag, then `SCRIBE_DATABASE_URL`, then
/// `DATABASE_URL`, then `database.url` if the configuration sets one.
pub fn pick_database_url(
    flag: Option<String>,
    scribe_env: Option<String>,
    database_env: Option<String>,
    configured: Option<&str>,
) -> Option<String> {
    flag.or(scribe_env)
        .or(database_env)
        .or_else(|| configured.map(str::to_string))
        .filter(|url| !url.trim().is_empty())
}

/// [`pick_database_url`] reading the process environment
pub fn database_url(flag: Option<String>, config: &ScribeConfig) -> Option<String> {
    pick_database_url(
        flag,
        std::env::var(DATABASE_URL_ENV).ok(),
        std::env::var("DATABASE_URL").ok(),
        config.database.url.as_deref(),
    )
}

/// Statement timeout of the migration session, if configured
pub fn statement_timeout(config: &ScribeConfig) -> Option<Duration> {
    config
        .migration
        .statement_timeout_seconds
        .filter(|seconds| *seconds > 0)
        .map(Duration::from_secs)
}
