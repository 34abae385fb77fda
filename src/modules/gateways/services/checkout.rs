// Gateway A: hosted checkout with a JSON API.
//
// Webhooks are JSON objects signed with HMAC-SHA256 over the canonical
// string of their top-level fields (keys sorted, `signature` excluded,
// `key=value` joined by `&`). The hex digest travels in `X-Signature`.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::gateway_trait::{
    parse_amount, GatewayStatus, Payer, PaymentGateway, PaymentOutcome, VerifiedEvent,
    WebhookHeaders,
};
use crate::config::CheckoutConfig;
use crate::core::signature::verify_hmac_sha256;
use crate::core::{AppError, Currency, Result};
use crate::modules::gateways::models::{CheckoutRedirect, SessionHandle};
use crate::modules::invoices::models::Invoice;

pub const SIGNATURE_HEADER: &str = "x-signature";

/// Render the string the webhook HMAC is computed over
pub fn canonical_string(fields: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = fields.keys().filter(|k| k.as_str() != "signature").collect();
    keys.sort();

    keys.into_iter()
        .map(|key| {
            let value = match &fields[key] {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            format!("{}={}", key, value)
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Checkout gateway client
pub struct CheckoutClient {
    client: Client,
    config: CheckoutConfig,
}

impl CheckoutClient {
    pub fn new(config: CheckoutConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn ensure_success(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(AppError::from_status(self.name(), status, &body))
    }
}

fn data(value: &Value) -> &Value {
    value.get("data").unwrap_or(value)
}

fn text_field(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl PaymentGateway for CheckoutClient {
    fn name(&self) -> &str {
        "checkout"
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        self.supported_currencies().contains(&currency)
    }

    fn supported_currencies(&self) -> Vec<Currency> {
        vec![Currency::COP, Currency::USD, Currency::EUR]
    }

    fn is_sandbox(&self) -> bool {
        !self.config.environment.is_production()
    }

    async fn create_session(&self, invoice: &Invoice, payer: &Payer) -> Result<SessionHandle> {
        let url = format!("{}/v1/checkout/sessions", self.config.base_url);

        #[derive(Serialize)]
        struct SessionPayer<'a> {
            name: &'a str,
            email: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            document: Option<&'a str>,
        }

        #[derive(Serialize)]
        struct SessionRequest<'a> {
            order_id: &'a str,
            amount: String,
            currency: Currency,
            description: String,
            payer: SessionPayer<'a>,
            #[serde(skip_serializing_if = "Option::is_none")]
            return_url: Option<&'a str>,
        }

        #[derive(Deserialize)]
        struct SessionResponse {
            id: String,
            #[serde(alias = "url", alias = "checkout_url")]
            redirect_url: String,
        }

        let request = SessionRequest {
            order_id: &invoice.id,
            amount: invoice.currency.format_plain(invoice.balance()),
            currency: invoice.currency,
            description: format!("Invoice {}-{}", invoice.year, invoice.number),
            payer: SessionPayer {
                name: &payer.name,
                email: &payer.email,
                document: payer.document.as_deref(),
            },
            return_url: self.config.return_url.as_deref(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::from_http(self.name(), e))?;

        let response = self.ensure_success(response).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::from_http(self.name(), e))?;

        let session: SessionResponse = serde_json::from_value(data(&body).clone())
            .map_err(|e| AppError::Internal(format!("Unexpected checkout session response: {}", e)))?;

        info!(
            gateway = %self.name(),
            invoice_id = %invoice.id,
            reference = %session.id,
            "Checkout session created"
        );

        Ok(SessionHandle {
            reference: session.id,
            checkout: CheckoutRedirect::get(session.redirect_url),
            sandbox: self.is_sandbox(),
        })
    }

    fn verify_webhook(&self, payload: &[u8], headers: &WebhookHeaders) -> Result<VerifiedEvent> {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .ok_or_else(|| AppError::SignatureInvalid("missing signature header".to_string()))?;

        let body: Value = serde_json::from_slice(payload)
            .map_err(|_| AppError::SignatureInvalid("payload is not JSON".to_string()))?;
        let fields = body
            .as_object()
            .ok_or_else(|| AppError::SignatureInvalid("payload is not an object".to_string()))?;

        if !verify_hmac_sha256(&canonical_string(fields), signature, &self.config.webhook_secret) {
            warn!(gateway = %self.name(), "Webhook signature mismatch");
            return Err(AppError::SignatureInvalid("hmac mismatch".to_string()));
        }

        // Authenticated from here on
        let invoice_id = text_field(&body, "order_id")
            .ok_or_else(|| AppError::validation("Webhook is missing order_id"))?;
        let external_status = text_field(&body, "status")
            .ok_or_else(|| AppError::validation("Webhook is missing status"))?;
        let transaction_id = text_field(&body, "transaction_id")
            .ok_or_else(|| AppError::validation("Webhook is missing transaction_id"))?;
        let amount = body
            .get("amount")
            .and_then(parse_amount)
            .ok_or_else(|| AppError::validation("Webhook amount is missing or invalid"))?;
        let currency = text_field(&body, "currency")
            .map(|c| c.parse::<Currency>().map_err(AppError::validation))
            .transpose()?;

        Ok(VerifiedEvent {
            gateway: self.name().to_string(),
            invoice_id,
            outcome: self.map_status(&external_status),
            external_status,
            amount,
            currency,
            transaction_id,
            session_reference: text_field(&body, "session_id"),
            payment_method: text_field(&body, "payment_method"),
            raw: body,
        })
    }

    async fn query_status(&self, reference: &str) -> Result<GatewayStatus> {
        let url = format!("{}/v1/transactions/{}", self.config.base_url, reference);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| AppError::from_http(self.name(), e))?;

        let response = self.ensure_success(response).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::from_http(self.name(), e))?;

        let payload = data(&body);
        let external_status = text_field(payload, "status")
            .ok_or_else(|| AppError::internal("Checkout status response has no status"))?;

        Ok(GatewayStatus {
            gateway: self.name().to_string(),
            reference: reference.to_string(),
            outcome: self.map_status(&external_status),
            external_status,
            transaction_id: text_field(payload, "transaction_id"),
            raw: body.clone(),
        })
    }

    fn map_status(&self, external_status: &str) -> PaymentOutcome {
        match external_status.to_ascii_lowercase().as_str() {
            "completed" | "approved" | "paid" | "succeeded" => PaymentOutcome::Completed,
            "failed" | "declined" | "error" => PaymentOutcome::Failed,
            "cancelled" | "canceled" | "voided" | "expired" => PaymentOutcome::Cancelled,
            _ => PaymentOutcome::Pending,
        }
    }
}
