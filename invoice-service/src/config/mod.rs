use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl InvoiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(InvoiceConfig {
            common,
            service_name: get_env("SERVICE_NAME", Some("invoice-service"))?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")))?,
            log_level: get_env("LOG_LEVEL", Some("info"))?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None)?,
                max_connections: get_env_parsed("DB_MAX_CONNECTIONS", "10")?,
                min_connections: get_env_parsed("DB_MIN_CONNECTIONS", "1")?,
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>) -> Result<String, AppError> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => default.map(str::to_string).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!(
                "Missing required environment variable: {key}"
            ))
        }),
    }
}

fn get_env_parsed<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default))?.parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("Invalid value for {key}: {e}"))
    })
}
