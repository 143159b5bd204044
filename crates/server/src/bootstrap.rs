use std::sync::Arc;

use forcage_core::config::{AppConfig, ConfigError, LoadOptions};
use forcage_core::DemandeLifecycle;
use forcage_db::{
    connect, migrations, DbPool, SqlClientProfileRepository, SqlDemandeRepository,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::events::{spawn_audit_subscriber, ChannelEventSink};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub lifecycle: DemandeLifecycle,
    /// Finishes once every lifecycle handle is dropped; yields the number of events logged.
    pub audit: JoinHandle<usize>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let (sink, receiver) = ChannelEventSink::new();
    let audit = spawn_audit_subscriber(receiver);
    let lifecycle = DemandeLifecycle::new(
        Arc::new(SqlDemandeRepository::new(db_pool.clone())),
        Arc::new(SqlClientProfileRepository::new(db_pool.clone())),
        Arc::new(sink),
    )
    .with_policy(config.lifecycle_policy());

    Ok(Application { config, db_pool, lifecycle, audit })
}

#[cfg(test)]
mod tests {
    use forcage_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_non_sqlite_url() {
        let result = bootstrap(overrides("postgres://localhost/forcage")).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("database.url"), "{message}");
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_lifecycle() {
        let app = bootstrap(overrides("sqlite::memory:?cache=shared")).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('demande', 'demande_history', 'client_profile')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema should be available after bootstrap");
        assert_eq!(table_count, 3);
        assert_eq!(app.lifecycle.policy().due_days, app.config.lifecycle.due_days);

        drop(app.lifecycle);
        assert_eq!(app.audit.await.expect("audit task"), 0);
        app.db_pool.close().await;
    }
}
