use std::str::FromStr;
use std::time::Duration;

use forcage_core::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the pool described by the `[database]` section of the config.
pub async fn connect(database: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&database.url, database.max_connections, database.timeout_secs).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let mut pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)));
    if is_in_memory(database_url) {
        // An in-memory database is dropped with its last connection.
        pool = pool.min_connections(1).idle_timeout(None).max_lifetime(None);
    }
    pool.connect_with(options).await
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_config(dir: &tempfile::TempDir) -> DatabaseConfig {
        DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("forcage.db").display()),
            max_connections: 2,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn connect_creates_the_file_and_applies_pragmas() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = connect(&file_config(&dir)).await.expect("connect");

        assert!(dir.path().join("forcage.db").exists());
        let journal: String =
            sqlx::query_scalar("PRAGMA journal_mode").fetch_one(&pool).await.expect("journal");
        assert_eq!(journal.to_lowercase(), "wal");
        let foreign_keys: i64 =
            sqlx::query_scalar("PRAGMA foreign_keys").fetch_one(&pool).await.expect("fk");
        assert_eq!(foreign_keys, 1);
    }

    #[tokio::test]
    async fn pool_size_follows_the_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = connect(&file_config(&dir)).await.expect("connect");
        assert_eq!(pool.options().get_max_connections(), 2);

        let zero = DatabaseConfig { max_connections: 0, ..file_config(&dir) };
        let pool = connect(&zero).await.expect("connect");
        assert_eq!(pool.options().get_max_connections(), 1);
    }

    #[test]
    fn in_memory_urls_are_recognised() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite::memory:?cache=shared"));
        assert!(is_in_memory("sqlite://forcage?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://data/forcage.db"));
    }

    #[tokio::test]
    async fn in_memory_pool_keeps_its_database_alive() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        assert_eq!(pool.options().get_min_connections(), 1);
        assert_eq!(pool.options().get_idle_timeout(), None);
    }
}
