use std::env;
use std::time::Duration;

use crate::core::{AppError, Result};
use crate::modules::gateways::models::GatewayEnvironment;

/// Fiscal (tax-authority) gateway configuration
#[derive(Clone)]
pub struct FiscalConfig {
    pub environment: GatewayEnvironment,
    pub base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub numbering_range_id: Option<String>,
    pub timeout: Duration,
    /// Periodic created→validated sweep; disabled when `None`
    pub sweep_interval: Option<Duration>,
}

// Credentials stay out of logs
impl std::fmt::Debug for FiscalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiscalConfig")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("has_credentials", &self.has_credentials())
            .field("timeout", &self.timeout)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

impl Default for FiscalConfig {
    fn default() -> Self {
        Self {
            environment: GatewayEnvironment::Sandbox,
            base_url: "https://api-sandbox.factus.com.co".to_string(),
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            numbering_range_id: None,
            timeout: Duration::from_secs(15),
            sweep_interval: None,
        }
    }
}

impl FiscalConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let environment = match env::var("FISCAL_ENV") {
            Ok(value) => value.parse().map_err(AppError::Configuration)?,
            Err(_) => defaults.environment,
        };

        let sweep_interval = match env::var("FISCAL_SWEEP_INTERVAL_SECS") {
            Ok(value) => {
                let secs: u64 = value.parse().map_err(|_| {
                    AppError::Configuration("Invalid FISCAL_SWEEP_INTERVAL_SECS".to_string())
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            Err(_) => None,
        };

        Ok(FiscalConfig {
            environment,
            base_url: env::var("FISCAL_BASE_URL").unwrap_or(defaults.base_url),
            client_id: optional("FISCAL_CLIENT_ID"),
            client_secret: optional("FISCAL_CLIENT_SECRET"),
            username: optional("FISCAL_USERNAME"),
            password: optional("FISCAL_PASSWORD"),
            numbering_range_id: optional("FISCAL_NUMBERING_RANGE_ID"),
            timeout: timeout_from_env("FISCAL_TIMEOUT_SECS", defaults.timeout)?,
            sweep_interval,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some()
            && self.client_secret.is_some()
            && self.username.is_some()
            && self.password.is_some()
    }
}

/// Non-empty environment variable
pub(crate) fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn timeout_from_env(name: &str, default: Duration) -> Result<Duration> {
    match env::var(name) {
        Ok(value) => {
            let secs: u64 = value
                .parse()
                .map_err(|_| AppError::Configuration(format!("Invalid {}", name)))?;
            if secs == 0 {
                return Err(AppError::Configuration(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(default),
    }
}
