// Gateway B: form-based checkout.
//
// Session creation needs no network call: we build the fields of an
// auto-submitting form posted to the gateway's checkout page. Confirmations
// arrive form-encoded, signed with MD5 over
//   cust_id|p_key|x_id_invoice|x_transaction_id|x_amount|x_currency_code|x_response

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::gateway_trait::{
    parse_amount, GatewayStatus, Payer, PaymentGateway, PaymentOutcome, VerifiedEvent,
    WebhookHeaders,
};
use crate::config::EpaycoConfig;
use crate::core::signature::{md5_tuple_hex, verify_md5_tuple};
use crate::core::{AppError, Currency, Result};
use crate::modules::gateways::models::{CheckoutRedirect, RedirectMethod, SessionHandle};
use crate::modules::invoices::models::Invoice;

pub struct EpaycoClient {
    client: Client,
    config: EpaycoConfig,
}

impl EpaycoClient {
    pub fn new(config: EpaycoConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Signature of a confirmation with the given fields
    pub fn confirmation_signature(&self, fields: &BTreeMap<String, String>) -> String {
        md5_tuple_hex(&self.confirmation_tuple(fields))
    }

    fn confirmation_tuple<'a>(&'a self, fields: &'a BTreeMap<String, String>) -> [&'a str; 7] {
        [
            self.config.customer_id.as_str(),
            self.config.p_key.as_str(),
            field(fields, "x_id_invoice"),
            field(fields, "x_transaction_id"),
            field(fields, "x_amount"),
            field(fields, "x_currency_code"),
            field(fields, "x_response"),
        ]
    }
}

fn field<'a>(fields: &'a BTreeMap<String, String>, name: &str) -> &'a str {
    fields.get(name).map(String::as_str).unwrap_or("")
}

fn required(fields: &BTreeMap<String, String>, name: &str) -> Result<String> {
    fields
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::validation(format!("Confirmation is missing {}", name)))
}

#[async_trait]
impl PaymentGateway for EpaycoClient {
    fn name(&self) -> &str {
        "epayco"
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        self.supported_currencies().contains(&currency)
    }

    fn supported_currencies(&self) -> Vec<Currency> {
        vec![Currency::COP, Currency::USD]
    }

    fn is_sandbox(&self) -> bool {
        !self.config.environment.is_production()
    }

    async fn create_session(&self, invoice: &Invoice, payer: &Payer) -> Result<SessionHandle> {
        let reference = Uuid::new_v4().to_string();
        let amount = invoice.currency.format_plain(invoice.balance());
        let currency = invoice.currency.to_string();

        let signature = md5_tuple_hex(&[
            self.config.customer_id.as_str(),
            self.config.p_key.as_str(),
            invoice.id.as_str(),
            amount.as_str(),
            currency.as_str(),
        ]);

        let mut fields = BTreeMap::new();
        fields.insert("p_cust_id_cliente".to_string(), self.config.customer_id.clone());
        fields.insert("p_id_invoice".to_string(), invoice.id.clone());
        fields.insert(
            "p_description".to_string(),
            format!("Invoice {}-{}", invoice.year, invoice.number),
        );
        fields.insert("p_amount".to_string(), amount.clone());
        fields.insert("p_amount_base".to_string(), amount);
        fields.insert("p_tax".to_string(), "0".to_string());
        fields.insert("p_currency_code".to_string(), currency);
        fields.insert(
            "p_test_request".to_string(),
            if self.is_sandbox() { "TRUE" } else { "FALSE" }.to_string(),
        );
        fields.insert("p_billing_name".to_string(), payer.name.clone());
        fields.insert("p_billing_email".to_string(), payer.email.clone());
        if let Some(document) = &payer.document {
            fields.insert("p_billing_document".to_string(), document.clone());
        }
        if let Some(url) = &self.config.response_url {
            fields.insert("p_url_response".to_string(), url.clone());
        }
        if let Some(url) = &self.config.confirmation_url {
            fields.insert("p_url_confirmation".to_string(), url.clone());
        }
        fields.insert("p_extra1".to_string(), reference.clone());
        fields.insert("p_signature".to_string(), signature);

        info!(
            gateway = %self.name(),
            invoice_id = %invoice.id,
            reference = %reference,
            "Checkout form prepared"
        );

        Ok(SessionHandle {
            reference,
            checkout: CheckoutRedirect {
                method: RedirectMethod::Post,
                url: self.config.checkout_url.clone(),
                fields,
            },
            sandbox: self.is_sandbox(),
        })
    }

    fn verify_webhook(&self, payload: &[u8], _headers: &WebhookHeaders) -> Result<VerifiedEvent> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(payload)
            .map_err(|_| AppError::SignatureInvalid("payload is not form-encoded".to_string()))?;
        let fields: BTreeMap<String, String> = pairs.into_iter().collect();

        let signature = fields
            .get("x_signature")
            .ok_or_else(|| AppError::SignatureInvalid("missing x_signature".to_string()))?;

        if !verify_md5_tuple(&self.confirmation_tuple(&fields), signature) {
            warn!(gateway = %self.name(), "Webhook signature mismatch");
            return Err(AppError::SignatureInvalid("md5 mismatch".to_string()));
        }

        // Authenticated from here on
        let invoice_id = required(&fields, "x_id_invoice")?;
        let transaction_id = required(&fields, "x_transaction_id")?;
        let external_status = required(&fields, "x_response")?;
        let amount = parse_amount(&Value::String(required(&fields, "x_amount")?))
            .ok_or_else(|| AppError::validation("Confirmation amount is invalid"))?;
        let currency = required(&fields, "x_currency_code")?
            .parse::<Currency>()
            .map_err(AppError::validation)?;

        let raw = serde_json::to_value(&fields)?;

        Ok(VerifiedEvent {
            gateway: self.name().to_string(),
            invoice_id,
            outcome: self.map_status(&external_status),
            external_status,
            amount,
            currency: Some(currency),
            transaction_id,
            // p_extra1 from the checkout form comes back as x_extra1
            session_reference: fields
                .get("x_extra1")
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            payment_method: fields.get("x_franchise").cloned(),
            raw,
        })
    }

    async fn query_status(&self, reference: &str) -> Result<GatewayStatus> {
        let url = format!(
            "{}/validation/v1/reference/{}",
            self.config.api_base_url, reference
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::from_http(self.name(), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::from_status(self.name(), status, &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::from_http(self.name(), e))?;

        let data = body.get("data").unwrap_or(&body);
        let external_status = data
            .get("x_response")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::not_found(format!("No {} transaction for {}", self.name(), reference)))?
            .to_string();
        let transaction_id = data.get("x_transaction_id").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Ok(GatewayStatus {
            gateway: self.name().to_string(),
            reference: reference.to_string(),
            outcome: self.map_status(&external_status),
            external_status,
            transaction_id,
            raw: body.clone(),
        })
    }

    fn map_status(&self, external_status: &str) -> PaymentOutcome {
        match external_status.trim().to_lowercase().as_str() {
            "aceptada" | "aprobada" => PaymentOutcome::Completed,
            "rechazada" | "fallida" => PaymentOutcome::Failed,
            "cancelada" | "abandonada" | "expirada" | "reversada" => PaymentOutcome::Cancelled,
            _ => PaymentOutcome::Pending,
        }
    }
}
