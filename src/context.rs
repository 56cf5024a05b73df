/// Application context and dependency injection
use crate::{
    cards::CardGraphService,
    config::ServerConfig,
    db,
    error::{CardError, CardResult},
    storage::{GraphTable, SqliteGraphTable},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub table_db: SqlitePool,
    pub table: Arc<dyn GraphTable>,
    pub cards: Arc<CardGraphService>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> CardResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directory if it doesn't exist
        Self::ensure_directories(&config).await?;

        // Initialize table database
        let options = db::DatabaseOptions {
            max_connections: config.storage.max_connections,
            ..Default::default()
        };
        let table_db = db::create_pool(&config.storage.table_db, options).await?;

        // Run migrations
        db::run_migrations(&table_db).await?;

        // Test connection
        db::test_connection(&table_db).await?;

        Ok(Self::with_pool(config, table_db))
    }

    /// Wire services over an already migrated pool
    pub fn with_pool(config: ServerConfig, table_db: SqlitePool) -> Self {
        let table: Arc<dyn GraphTable> = Arc::new(SqliteGraphTable::new(
            table_db.clone(),
            config.storage.call_timeout(),
        ));
        let cards = Arc::new(CardGraphService::new(table.clone(), config.cards.clone()));

        Self {
            config: Arc::new(config),
            table_db,
            table,
            cards,
        }
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> CardResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                CardError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
