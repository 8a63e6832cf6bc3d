// config.rs
use std::env;
use std::time::Duration;

use crate::errors::{AppError, Result};

pub const DEFAULT_DATABASE_NAME: &str = "rugby_pools";
pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_AUTOSAVE_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_name: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub autosave_delay: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let store_backend = match lookup("STORE_BACKEND").as_deref() {
            None | Some("mongo") => StoreBackend::Mongo,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(AppError::configuration(format!(
                    "STORE_BACKEND must be `mongo` or `memory`, got `{other}`"
                )))
            }
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        if store_backend == StoreBackend::Mongo && database_url.is_none() {
            return Err(AppError::configuration("DATABASE_URL must be set"));
        }

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| AppError::configuration("JWT_SECRET must be set"))?;

        let port = match lookup("PORT") {
            Some(port) => port
                .parse()
                .map_err(|_| AppError::configuration(format!("PORT must be a number, got `{port}`")))?,
            None => DEFAULT_PORT,
        };

        let autosave_delay_ms = match lookup("AUTOSAVE_DELAY_MS") {
            Some(delay) => delay.parse().map_err(|_| {
                AppError::configuration(format!("AUTOSAVE_DELAY_MS must be a number, got `{delay}`"))
            })?,
            None => DEFAULT_AUTOSAVE_DELAY_MS,
        };

        Ok(AppConfig {
            store_backend,
            database_url,
            database_name: lookup("DATABASE_NAME")
                .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string()),
            jwt_secret,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            autosave_delay: Duration::from_millis(autosave_delay_ms),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
