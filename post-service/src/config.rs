/// Configuration management for Post Service
///
/// Loads configuration from environment variables.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// Kafka configuration
    pub kafka: KafkaConfig,
    /// Cache TTLs
    pub cache: CacheConfig,
    /// Identity service (replica backfill source)
    pub identity: IdentityConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port for health checks and metrics
    pub http_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Min connections in pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
}

/// Kafka configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Comma-separated broker list
    pub brokers: String,
    /// Consumer group id, shared by every instance of this service
    pub group_id: String,
    /// Upper bound on a single handler invocation
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
    /// How long processed (event_id, topic) rows are retained
    #[serde(default = "default_processed_retention_days")]
    pub processed_retention_days: u64,
    /// Interval between retention sweeps
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

/// Cache TTL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for cached post entries
    #[serde(default = "default_post_ttl_secs")]
    pub post_ttl_secs: u64,
    /// TTL for cached like/reply counters
    #[serde(default = "default_counter_ttl_secs")]
    pub counter_ttl_secs: u64,
}

/// Identity service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Base URL of the identity service
    pub base_url: String,
    /// Internal API key for the snapshot endpoint; only needed when the
    /// replica is empty at startup
    pub internal_api_key: Option<String>,
}

// Default values
fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_handler_timeout_secs() -> u64 {
    30
}

fn default_processed_retention_days() -> u64 {
    30
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_post_ttl_secs() -> u64 {
    3600
}

fn default_counter_ttl_secs() -> u64 {
    604800 // 7 days
}

impl KafkaConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    pub fn processed_retention(&self) -> Duration {
        Duration::from_secs(self.processed_retention_days * 86400)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8003), // post-service default HTTP port
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable not set")?,
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_max_connections),
            min_connections: std::env::var("DB_MIN_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_min_connections),
        };

        let redis = RedisConfig {
            url: std::env::var("REDIS_URL")
                .context("REDIS_URL environment variable not set")?,
        };

        let kafka = KafkaConfig {
            brokers: std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string()),
            group_id: std::env::var("KAFKA_GROUP_ID")
                .unwrap_or_else(|_| "post-service".to_string()),
            handler_timeout_secs: std::env::var("EVENT_HANDLER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_handler_timeout_secs),
            processed_retention_days: std::env::var("PROCESSED_EVENTS_RETENTION_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_processed_retention_days),
            cleanup_interval_secs: std::env::var("PROCESSED_EVENTS_CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_cleanup_interval_secs),
        };

        let cache = CacheConfig {
            post_ttl_secs: std::env::var("POST_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_post_ttl_secs),
            counter_ttl_secs: std::env::var("COUNTER_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_counter_ttl_secs),
        };

        let identity = IdentityConfig {
            base_url: std::env::var("IDENTITY_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            internal_api_key: std::env::var("INTERNAL_API_KEY").ok(),
        };

        Ok(Config {
            app,
            database,
            redis,
            kafka,
            cache,
            identity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_default_values() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("REDIS_URL", "redis://localhost");
        std::env::remove_var("KAFKA_BROKERS");
        std::env::remove_var("EVENT_HANDLER_TIMEOUT_SECS");

        let config = Config::from_env().unwrap();

        assert_eq!(config.app.env, "development");
        assert_eq!(config.app.host, "0.0.0.0");
        assert_eq!(config.app.http_port, 8003);
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.kafka.brokers, "localhost:9092");
        assert_eq!(config.kafka.group_id, "post-service");
        assert_eq!(config.kafka.handler_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.kafka.processed_retention(),
            Duration::from_secs(30 * 86400)
        );
        assert_eq!(config.cache.post_ttl_secs, 3600);
        assert_eq!(config.cache.counter_ttl_secs, 604800);
    }

    #[test]
    #[serial]
    fn test_missing_database_url_fails() {
        std::env::remove_var("DATABASE_URL");
        std::env::set_var("REDIS_URL", "redis://localhost");

        let result = Config::from_env();
        assert!(result.is_err());

        std::env::set_var("DATABASE_URL", "postgres://test");
    }
}
