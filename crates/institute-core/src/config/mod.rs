use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::checkin::ReviewConfig;
use crate::workflows::enrollment::AllocatorConfig;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub allocator: AllocatorConfig,
    pub review: ReviewConfig,
    pub database: DatabaseConfig,
    pub seed_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let defaults = AllocatorConfig::default();
        let batch_capacity = match env::var("BATCH_CAPACITY") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|capacity| *capacity > 0)
                .ok_or(ConfigError::InvalidBatchCapacity(raw))?,
            Err(_) => defaults.batch_capacity,
        };
        let max_attempts = match env::var("ALLOCATION_MAX_ATTEMPTS") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|attempts| *attempts > 0)
                .ok_or(ConfigError::InvalidMaxAttempts(raw))?,
            Err(_) => defaults.max_attempts,
        };
        let queue_limit = match env::var("REVIEW_QUEUE_LIMIT") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or(ConfigError::InvalidQueueLimit(raw))?,
            Err(_) => ReviewConfig::default().queue_limit,
        };

        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|connections| *connections > 0)
                .ok_or(ConfigError::InvalidMaxConnections(raw))?,
            Err(_) => DatabaseConfig::DEFAULT_MAX_CONNECTIONS,
        };

        let seed_path = env::var("SEED_PATH")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            allocator: AllocatorConfig {
                batch_capacity,
                max_attempts,
            },
            review: ReviewConfig { queue_limit },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            seed_path,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Postgres connection settings. Without a URL the service keeps its state in process.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidBatchCapacity(String),
    InvalidMaxAttempts(String),
    InvalidQueueLimit(String),
    InvalidMaxConnections(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidBatchCapacity(raw) => {
                write!(f, "BATCH_CAPACITY must be a positive integer, got '{raw}'")
            }
            ConfigError::InvalidMaxAttempts(raw) => write!(
                f,
                "ALLOCATION_MAX_ATTEMPTS must be a positive integer, got '{raw}'"
            ),
            ConfigError::InvalidQueueLimit(raw) => {
                write!(f, "REVIEW_QUEUE_LIMIT must be a positive integer, got '{raw}'")
            }
            ConfigError::InvalidMaxConnections(raw) => write!(
                f,
                "DATABASE_MAX_CONNECTIONS must be a positive integer, got '{raw}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidBatchCapacity(_)
            | ConfigError::InvalidMaxAttempts(_)
            | ConfigError::InvalidQueueLimit(_)
            | ConfigError::InvalidMaxConnections(_) => None,
        }
    }
}
