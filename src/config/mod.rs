use crate::core::{AppError, Result};
use std::env;

pub mod database;
pub mod fiscal;
pub mod gateways;
pub mod server;

pub use database::DatabaseConfig;
pub use fiscal::FiscalConfig;
pub use gateways::{CheckoutConfig, EpaycoConfig};
pub use server::ServerConfig;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub fiscal: FiscalConfig,
    pub checkout: Option<CheckoutConfig>,
    pub epayco: Option<EpaycoConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let log_format = match env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "pretty".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "pretty" | "text" => LogFormat::Pretty,
            other => {
                return Err(AppError::Configuration(format!(
                    "Invalid LOG_FORMAT: {}",
                    other
                )))
            }
        };

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_format,
            },
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            fiscal: FiscalConfig::from_env()?,
            checkout: CheckoutConfig::from_env()?,
            epayco: EpaycoConfig::from_env()?,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.workers == 0 {
            return Err(AppError::Configuration(
                "Server workers must be greater than 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::Configuration(
                "DATABASE_POOL_SIZE cannot exceed DATABASE_MAX_CONNECTIONS".to_string(),
            ));
        }

        if self.fiscal.environment.is_production() && !self.fiscal.has_credentials() {
            // Not fatal: every fiscal call reports a configuration error and
            // invoices keep working without a fiscal document.
            tracing::warn!("FISCAL_ENV=production without complete fiscal credentials");
        }

        Ok(())
    }
}
