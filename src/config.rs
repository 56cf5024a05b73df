/// Configuration management for the flashcard graph service
use crate::error::{CardError, CardResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "flashcard_graph=debug,tower_http=debug";

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub cards: CardsConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    /// SQLite file holding the card graph table
    pub table_db: PathBuf,
    pub max_connections: u32,
    /// Upper bound for a single storage gateway call
    pub call_timeout_ms: u64,
}

/// Card graph behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardsConfig {
    pub default_page_size: usize,
    pub practice_page_size: usize,
    /// Largest page size a caller may request
    pub max_page_size: usize,
    /// Longest wait for the practice label index to show a fresh session
    pub consistency_max_wait_ms: u64,
    pub consistency_poll_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" or "pretty"
    pub format: String,
}

impl CardsConfig {
    pub fn consistency_max_wait(&self) -> Duration {
        Duration::from_millis(self.consistency_max_wait_ms)
    }

    pub fn consistency_poll_interval(&self) -> Duration {
        Duration::from_millis(self.consistency_poll_interval_ms)
    }
}

impl Default for CardsConfig {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            practice_page_size: 20,
            max_page_size: 1000,
            consistency_max_wait_ms: 2000,
            consistency_poll_interval_ms: 100,
        }
    }
}

impl LoggingConfig {
    /// Tracing filter built from the configured directives
    pub fn env_filter(&self) -> CardResult<EnvFilter> {
        EnvFilter::try_new(&self.level).map_err(|e| {
            CardError::Validation(format!("Invalid log filter '{}': {}", self.level, e))
        })
    }
}

impl StorageConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> CardResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("CARDS_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("CARDS_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| CardError::Validation("Invalid port number".to_string()))?;
        let version = env::var("CARDS_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("CARDS_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let table_db = env::var("CARDS_TABLE_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("cards.sqlite"));
        let max_connections = env::var("CARDS_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let call_timeout_ms = env::var("CARDS_STORAGE_CALL_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .unwrap_or(5000);

        let defaults = CardsConfig::default();
        let default_page_size = env::var("CARDS_DEFAULT_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.default_page_size);
        let practice_page_size = env::var("CARDS_PRACTICE_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.practice_page_size);
        let max_page_size = env::var("CARDS_MAX_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_page_size);
        let consistency_max_wait_ms = env::var("CARDS_CONSISTENCY_MAX_WAIT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.consistency_max_wait_ms);
        let consistency_poll_interval_ms = env::var("CARDS_CONSISTENCY_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.consistency_poll_interval_ms);

        let level = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
        let format = env::var("CARDS_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                table_db,
                max_connections,
                call_timeout_ms,
            },
            cards: CardsConfig {
                default_page_size,
                practice_page_size,
                max_page_size,
                consistency_max_wait_ms,
                consistency_poll_interval_ms,
            },
            logging: LoggingConfig { level, format },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> CardResult<()> {
        if self.service.hostname.is_empty() {
            return Err(CardError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.storage.max_connections == 0 {
            return Err(CardError::Validation(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        if self.storage.call_timeout_ms == 0 {
            return Err(CardError::Validation(
                "Storage call timeout must be positive".to_string(),
            ));
        }

        if self.cards.default_page_size == 0 || self.cards.practice_page_size == 0 {
            return Err(CardError::Validation(
                "Page sizes must be positive".to_string(),
            ));
        }

        if self.cards.default_page_size > self.cards.max_page_size
            || self.cards.practice_page_size > self.cards.max_page_size
        {
            return Err(CardError::Validation(
                "Default page sizes cannot exceed the max page size".to_string(),
            ));
        }

        if self.cards.consistency_poll_interval_ms == 0
            || self.cards.consistency_poll_interval_ms > self.cards.consistency_max_wait_ms
        {
            return Err(CardError::Validation(
                "Consistency poll interval must be positive and within the max wait".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(CardError::Validation(format!(
                "Unknown log format '{}'",
                self.logging.format
            )));
        }

        self.logging.env_filter()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ServerConfig {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 3000,
                version: "test".to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                table_db: PathBuf::from("./data/cards.sqlite"),
                max_connections: 4,
                call_timeout_ms: 1000,
            },
            cards: CardsConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let mut config = sample_config();
        config.cards.practice_page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_poll_interval_beyond_max_wait() {
        let mut config = sample_config();
        config.cards.consistency_max_wait_ms = 50;
        config.cards.consistency_poll_interval_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let mut config = sample_config();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_default_page_size_above_max() {
        let mut config = sample_config();
        config.cards.max_page_size = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_filter_from_level() {
        let mut config = sample_config();
        config.logging.level = DEFAULT_LOG_FILTER.to_string();
        assert!(config.logging.env_filter().is_ok());
        assert!(config.validate().is_ok());

        config.logging.level = "flashcard_graph=loud".to_string();
        assert!(matches!(
            config.logging.env_filter(),
            Err(CardError::Validation(_))
        ));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations() {
        let cards = CardsConfig::default();
        assert_eq!(cards.consistency_max_wait(), Duration::from_secs(2));
        assert_eq!(cards.consistency_poll_interval(), Duration::from_millis(100));
    }
}
