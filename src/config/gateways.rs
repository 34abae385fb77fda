use std::env;
use std::time::Duration;

use super::fiscal::{optional, timeout_from_env};
use crate::core::{AppError, Result};
use crate::modules::gateways::models::GatewayEnvironment;

/// Gateway A: JSON API with HMAC-signed webhooks
#[derive(Clone)]
pub struct CheckoutConfig {
    pub api_key: String,
    pub webhook_secret: String,
    pub base_url: String,
    pub environment: GatewayEnvironment,
    pub return_url: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for CheckoutConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutConfig")
            .field("base_url", &self.base_url)
            .field("environment", &self.environment)
            .field("return_url", &self.return_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CheckoutConfig {
    /// Load gateway A settings; `None` when `CHECKOUT_API_KEY` is unset
    pub fn from_env() -> Result<Option<Self>> {
        let Some(api_key) = optional("CHECKOUT_API_KEY") else {
            return Ok(None);
        };

        let webhook_secret = optional("CHECKOUT_WEBHOOK_SECRET").ok_or_else(|| {
            AppError::Configuration("CHECKOUT_WEBHOOK_SECRET not set".to_string())
        })?;

        Ok(Some(CheckoutConfig {
            api_key,
            webhook_secret,
            base_url: env::var("CHECKOUT_BASE_URL")
                .unwrap_or_else(|_| "https://sandbox.checkout.example".to_string()),
            environment: environment_from_env("CHECKOUT_ENV")?,
            return_url: optional("CHECKOUT_RETURN_URL"),
            timeout: timeout_from_env("CHECKOUT_TIMEOUT_SECS", Duration::from_secs(15))?,
        }))
    }
}

/// Gateway B: form redirect with MD5-signed confirmations
#[derive(Clone)]
pub struct EpaycoConfig {
    pub customer_id: String,
    pub p_key: String,
    pub checkout_url: String,
    pub api_base_url: String,
    pub confirmation_url: Option<String>,
    pub response_url: Option<String>,
    pub environment: GatewayEnvironment,
    pub timeout: Duration,
}

impl std::fmt::Debug for EpaycoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpaycoConfig")
            .field("customer_id", &self.customer_id)
            .field("checkout_url", &self.checkout_url)
            .field("api_base_url", &self.api_base_url)
            .field("environment", &self.environment)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl EpaycoConfig {
    /// Load gateway B settings; `None` when `EPAYCO_CUSTOMER_ID` is unset
    pub fn from_env() -> Result<Option<Self>> {
        let Some(customer_id) = optional("EPAYCO_CUSTOMER_ID") else {
            return Ok(None);
        };

        let p_key = optional("EPAYCO_P_KEY")
            .ok_or_else(|| AppError::Configuration("EPAYCO_P_KEY not set".to_string()))?;

        Ok(Some(EpaycoConfig {
            customer_id,
            p_key,
            checkout_url: env::var("EPAYCO_CHECKOUT_URL")
                .unwrap_or_else(|_| "https://secure.payco.co/checkout.php".to_string()),
            api_base_url: env::var("EPAYCO_API_BASE_URL")
                .unwrap_or_else(|_| "https://secure.epayco.co".to_string()),
            confirmation_url: optional("EPAYCO_CONFIRMATION_URL"),
            response_url: optional("EPAYCO_RESPONSE_URL"),
            environment: environment_from_env("EPAYCO_ENV")?,
            timeout: timeout_from_env("EPAYCO_TIMEOUT_SECS", Duration::from_secs(15))?,
        }))
    }
}

fn environment_from_env(name: &str) -> Result<GatewayEnvironment> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(AppError::Configuration),
        Err(_) => Ok(GatewayEnvironment::Sandbox),
    }
}
