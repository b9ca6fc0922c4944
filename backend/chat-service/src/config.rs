use crate::error::AppError;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Where relationship and message data lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local store for local runs; data is lost on restart
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(AppError::Config(format!(
                "STORE_BACKEND must be postgres or memory, got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: usize,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    /// Present when `store_backend` is Postgres
    pub db: Option<DbConfig>,
    pub identity_header: String,
    pub max_page_size: i32,
    pub ws: WsConfig,
    /// Accounts created at startup by the memory backend
    pub seed_users: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let store_backend = StoreBackend::parse(
            &env::var("STORE_BACKEND").unwrap_or_else(|_| "postgres".to_string()),
        )?;

        let db = match store_backend {
            StoreBackend::Postgres => {
                let database_url = env::var("DATABASE_URL")
                    .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
                Some(DbConfig {
                    database_url,
                    max_connections: parse_var("DB_MAX_CONNECTIONS", 16)?,
                    connect_timeout_secs: parse_var("DB_CONNECT_TIMEOUT_SECS", 5)?,
                })
            }
            StoreBackend::Memory => None,
        };

        let max_page_size: i32 = parse_var("MAX_PAGE_SIZE", 100)?;
        if max_page_size <= 0 {
            return Err(AppError::Config("MAX_PAGE_SIZE must be positive".into()));
        }

        let heartbeat_secs: u64 = parse_var("WS_HEARTBEAT_INTERVAL_SECS", 5)?;
        let timeout_secs: u64 = parse_var("WS_CLIENT_TIMEOUT_SECS", 30)?;
        if heartbeat_secs == 0 || timeout_secs <= heartbeat_secs {
            return Err(AppError::Config(
                "WS_CLIENT_TIMEOUT_SECS must exceed a non-zero WS_HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }

        Ok(Self {
            port: parse_var("PORT", 8080)?,
            store_backend,
            db,
            identity_header: env::var("IDENTITY_HEADER")
                .unwrap_or_else(|_| actix_middleware::DEFAULT_IDENTITY_HEADER.to_string()),
            max_page_size,
            ws: WsConfig {
                heartbeat_interval: Duration::from_secs(heartbeat_secs),
                client_timeout: Duration::from_secs(timeout_secs),
            },
            seed_users: env::var("SEED_USERS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{name} has an invalid value: {raw:?}"))),
        Err(_) => Ok(default),
    }
}
