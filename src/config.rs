//! Process configuration, read from the environment (and `.env`).
//!
//! | variable                  | default                                   |
//! |---------------------------|-------------------------------------------|
//! | `HOST`                    | `0.0.0.0`                                 |
//! | `PORT`                    | `4001`                                    |
//! | `DATABASE_URL`            | `sqlite://huddle.db`                      |
//! | `DATABASE_MAX_CONNECTIONS`| `16`                                      |
//! | `ALLOWED_ORIGINS`         | `http://localhost:8000,http://localhost:3000` |
//! | `HUDDLE_STORE_TIMEOUT_MS` | `5000`                                    |
//! | `HUDDLE_STORE_ATTEMPTS`   | `2`                                       |
//! | `HUDDLE_HISTORY_LIMIT`    | `200`                                     |
//! | `RUST_LOG`                | `info,huddle=debug,sqlx=warn`             |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::rooms::RelayConfig;

const DEFAULT_ORIGINS: &[&str] = &["http://localhost:8000", "http://localhost:3000"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a number, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },

    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub allowed_origins: Vec<String>,
    pub store_timeout: Duration,
    pub store_attempts: u32,
    pub history_limit: usize,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        let allowed_origins = match lookup("ALLOWED_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_owned)
                .collect(),
            None => DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        Ok(Self {
            host: string("HOST", "0.0.0.0"),
            port: number(&lookup, "PORT", 4001)?,
            database_url: string("DATABASE_URL", "sqlite://huddle.db"),
            database_max_connections: positive(&lookup, "DATABASE_MAX_CONNECTIONS", 16)?,
            allowed_origins,
            store_timeout: Duration::from_millis(positive(&lookup, "HUDDLE_STORE_TIMEOUT_MS", 5000)?),
            store_attempts: positive(&lookup, "HUDDLE_STORE_ATTEMPTS", 2)?,
            history_limit: positive(&lookup, "HUDDLE_HISTORY_LIMIT", 200)?,
            log_filter: string("RUST_LOG", "info,huddle=debug,sqlx=warn"),
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))
    }

    pub fn relay(&self) -> RelayConfig {
        RelayConfig {
            history_limit: self.history_limit,
            store_timeout: self.store_timeout,
            store_attempts: self.store_attempts,
        }
    }
}

fn number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        None => Ok(default),
    }
}

fn positive<T: FromStr + Default + PartialEq>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    let value = number(lookup, key, default)?;
    if value == T::default() {
        return Err(ConfigError::Zero { key });
    }
    Ok(value)
}
