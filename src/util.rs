use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use std::path::PathBuf;

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SqliteConfig {
    pub path: PathBuf,
    pub create_if_missing: bool,
    #[serde_as(as = "DisplayFromStr")]
    pub journal_mode: SqliteJournalMode,
    pub max_connections: u32,
}

impl From<SqliteConfig> for SqliteConnectOptions {
    fn from(config: SqliteConfig) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(config.create_if_missing)
            .journal_mode(config.journal_mode)
    }
}

/// Create a pool for a private in-memory database. A single, never recycled connection is used,
/// because every SQLite in-memory connection has its own database.
#[cfg(test)]
pub async fn in_memory_pool() -> Result<sqlx::SqlitePool, sqlx::Error> {
    use sqlx::sqlite::SqlitePoolOptions;
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}
