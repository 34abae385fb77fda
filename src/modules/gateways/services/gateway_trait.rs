use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{Currency, Result};
use crate::modules::gateways::models::{SessionHandle, SessionStatus};
use crate::modules::invoices::models::Invoice;

/// Payment gateway capability: sessions, webhook verification, status queries
///
/// Adapters hide their wire format; the reconciliation engine only ever sees
/// a `VerifiedEvent`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Get gateway name (route segment and ledger key)
    fn name(&self) -> &str;

    /// Check if gateway supports a currency
    fn supports_currency(&self, currency: Currency) -> bool;

    fn supported_currencies(&self) -> Vec<Currency>;

    fn is_sandbox(&self) -> bool;

    /// Start a payment attempt for the invoice's outstanding balance
    async fn create_session(&self, invoice: &Invoice, payer: &Payer) -> Result<SessionHandle>;

    /// Authenticate an inbound callback and decode it
    ///
    /// # Errors
    /// * `SignatureInvalid` - the recomputed signature does not match; nothing
    ///   in the payload may be used
    /// * `Validation` - signature matched but the payload is malformed
    fn verify_webhook(&self, payload: &[u8], headers: &WebhookHeaders) -> Result<VerifiedEvent>;

    /// Ask the gateway for the current status of a session or transaction
    async fn query_status(&self, reference: &str) -> Result<GatewayStatus>;

    /// Map the gateway's status vocabulary to the universal outcome
    fn map_status(&self, external_status: &str) -> PaymentOutcome;
}

/// Universal outcome of a payment event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Completed,
    Failed,
    Cancelled,
    Pending,
}

impl PaymentOutcome {
    /// Session status an outcome settles to, if any
    pub fn session_status(&self) -> Option<SessionStatus> {
        match self {
            PaymentOutcome::Completed => Some(SessionStatus::Completed),
            PaymentOutcome::Failed => Some(SessionStatus::Failed),
            PaymentOutcome::Cancelled => Some(SessionStatus::Cancelled),
            PaymentOutcome::Pending => None,
        }
    }
}

impl std::fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentOutcome::Completed => write!(f, "completed"),
            PaymentOutcome::Failed => write!(f, "failed"),
            PaymentOutcome::Cancelled => write!(f, "cancelled"),
            PaymentOutcome::Pending => write!(f, "pending"),
        }
    }
}

/// Gateway-agnostic, authenticated payment event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedEvent {
    pub gateway: String,
    pub invoice_id: String,
    /// Status in the gateway's own vocabulary
    pub external_status: String,
    pub outcome: PaymentOutcome,
    pub amount: Decimal,
    /// `None` when the gateway omits it
    pub currency: Option<Currency>,
    pub transaction_id: String,
    /// Session the gateway echoed back, `None` when it was not echoed
    pub session_reference: Option<String>,
    pub payment_method: Option<String>,
    pub raw: serde_json::Value,
}

/// Result of a read-only status query
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    pub gateway: String,
    pub reference: String,
    pub external_status: String,
    pub outcome: PaymentOutcome,
    pub transaction_id: Option<String>,
    pub raw: serde_json::Value,
}

/// Who is paying
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payer {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub document: Option<String>,
}

/// Request headers with lowercased names
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders(BTreeMap<String, String>);

impl WebhookHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for WebhookHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = WebhookHeaders::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}

/// Parse an amount that may arrive as a JSON number or string
pub fn parse_amount(value: &serde_json::Value) -> Option<Decimal> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        _ => return None,
    };

    text.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(&text).ok())
}
