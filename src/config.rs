// config.rs
use dotenv::dotenv;
use std::env;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{AppError, Result};

pub const OVERS_PER_INNINGS_RANGE: RangeInclusive<u32> = 1..=50;
pub const TEAM_SIZE_RANGE: RangeInclusive<u8> = 2..=11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::configuration(format!(
                "STORE_BACKEND must be 'mongo' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_name: String,
    pub port: u16,
    pub host: String,
    pub default_overs_per_innings: u32,
    pub default_team_size: u8,
    pub persist_max_attempts: u32,
    pub persist_retry_backoff_ms: u64,
    pub match_mailbox_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Mongo,
            database_url: None,
            database_name: "sportsdb".to_string(),
            port: 3000,
            host: "0.0.0.0".to_string(),
            default_overs_per_innings: 20,
            default_team_size: 11,
            persist_max_attempts: 3,
            persist_retry_backoff_ms: 200,
            match_mailbox_capacity: 64,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::configuration(format!("{} must be a number, got '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let defaults = Self::default();

        let store_backend = match env::var("STORE_BACKEND") {
            Ok(raw) => raw.parse::<StoreBackend>()?,
            Err(_) => defaults.store_backend,
        };

        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Mongo && database_url.is_none() {
            return Err(AppError::configuration("DATABASE_URL must be set"));
        }

        let config = AppConfig {
            store_backend,
            database_url,
            database_name: env::var("DATABASE_NAME").unwrap_or(defaults.database_name),
            port: parse_var("PORT", defaults.port)?,
            host: env::var("HOST").unwrap_or(defaults.host),
            default_overs_per_innings: parse_var(
                "DEFAULT_OVERS_PER_INNINGS",
                defaults.default_overs_per_innings,
            )?,
            default_team_size: parse_var("DEFAULT_TEAM_SIZE", defaults.default_team_size)?,
            persist_max_attempts: parse_var("PERSIST_MAX_ATTEMPTS", defaults.persist_max_attempts)?,
            persist_retry_backoff_ms: parse_var(
                "PERSIST_RETRY_BACKOFF_MS",
                defaults.persist_retry_backoff_ms,
            )?,
            match_mailbox_capacity: parse_var(
                "MATCH_MAILBOX_CAPACITY",
                defaults.match_mailbox_capacity,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Same bounds a `CreateMatch` request is held to.
    pub fn validate(&self) -> Result<()> {
        if !OVERS_PER_INNINGS_RANGE.contains(&self.default_overs_per_innings) {
            return Err(AppError::configuration(format!(
                "DEFAULT_OVERS_PER_INNINGS must be between {} and {}, got {}",
                OVERS_PER_INNINGS_RANGE.start(),
                OVERS_PER_INNINGS_RANGE.end(),
                self.default_overs_per_innings
            )));
        }
        if !TEAM_SIZE_RANGE.contains(&self.default_team_size) {
            return Err(AppError::configuration(format!(
                "DEFAULT_TEAM_SIZE must be between {} and {}, got {}",
                TEAM_SIZE_RANGE.start(),
                TEAM_SIZE_RANGE.end(),
                self.default_team_size
            )));
        }
        if self.persist_max_attempts == 0 {
            return Err(AppError::configuration("PERSIST_MAX_ATTEMPTS must be at least 1"));
        }
        if self.match_mailbox_capacity == 0 {
            return Err(AppError::configuration("MATCH_MAILBOX_CAPACITY must be at least 1"));
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.persist_retry_backoff_ms)
    }

    pub fn get_config_info(&self) -> serde_json::Value {
        serde_json::json!({
            "store_backend": format!("{:?}", self.store_backend).to_lowercase(),
            "database_name": self.database_name,
            "database_url_set": self.database_url.is_some(),
            "default_overs_per_innings": self.default_overs_per_innings,
            "default_team_size": self.default_team_size,
            "persist_max_attempts": self.persist_max_attempts,
            "persist_retry_backoff_ms": self.persist_retry_backoff_ms,
            "port": self.port,
            "host": self.host,
        })
    }
}
