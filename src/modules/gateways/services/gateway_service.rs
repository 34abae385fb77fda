use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use super::gateway_trait::{GatewayStatus, Payer, PaymentGateway, VerifiedEvent, WebhookHeaders};
use crate::core::{AppError, Currency, Result};
use crate::modules::gateways::models::{CheckoutRedirect, GatewaySession};
use crate::modules::invoices::models::{Invoice, PaymentStatus};
use crate::modules::invoices::repositories::InvoiceRepository;

/// Service for managing and routing to payment gateways
pub struct GatewayService {
    gateways: HashMap<String, Arc<dyn PaymentGateway>>,
    invoice_repo: Arc<dyn InvoiceRepository>,
}

impl GatewayService {
    pub fn new(invoice_repo: Arc<dyn InvoiceRepository>) -> Self {
        Self {
            gateways: HashMap::new(),
            invoice_repo,
        }
    }

    /// Register a gateway under its own name
    pub fn register_gateway(&mut self, gateway: Arc<dyn PaymentGateway>) {
        let name = gateway.name().to_string();
        info!(gateway = %name, sandbox = gateway.is_sandbox(), "Payment gateway registered");
        self.gateways.insert(name, gateway);
    }

    /// Get a gateway by name
    pub fn get_gateway(&self, name: &str) -> Result<Arc<dyn PaymentGateway>> {
        self.gateways
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Gateway '{}' not found", name)))
    }

    /// List all available gateways
    pub fn list_gateways(&self) -> Vec<GatewayInfo> {
        let mut gateways: Vec<GatewayInfo> = self
            .gateways
            .values()
            .map(|gateway| GatewayInfo {
                name: gateway.name().to_string(),
                supported_currencies: gateway.supported_currencies(),
                sandbox: gateway.is_sandbox(),
            })
            .collect();
        gateways.sort_by(|a, b| a.name.cmp(&b.name));
        gateways
    }

    /// Check if a gateway supports a currency
    pub fn supports_currency(&self, gateway_name: &str, currency: Currency) -> Result<bool> {
        Ok(self.get_gateway(gateway_name)?.supports_currency(currency))
    }

    /// Start (or resume) a payment attempt on an invoice
    ///
    /// Returns the existing pending session when there is one, so an invoice
    /// never has two active sessions on the same gateway.
    ///
    /// # Errors
    /// * `NotFound` - unknown invoice or gateway
    /// * `StateConflict` - invoice already paid
    /// * `Validation` - gateway does not support the invoice currency
    pub async fn open_session(
        &self,
        invoice_id: &str,
        gateway_name: &str,
        payer: &Payer,
    ) -> Result<GatewaySession> {
        let gateway = self.get_gateway(gateway_name)?;
        let invoice = self.load_invoice(invoice_id).await?;

        if invoice.payment_status == PaymentStatus::Paid {
            return Err(AppError::conflict(format!(
                "Invoice {} is already paid",
                invoice.id
            )));
        }

        if !gateway.supports_currency(invoice.currency) {
            return Err(AppError::validation(format!(
                "Gateway {} does not support currency {}",
                gateway_name, invoice.currency
            )));
        }

        if let Some(active) = invoice.active_session(gateway_name) {
            return Ok(active.clone());
        }

        Self::validate_payer(payer)?;

        let handle = match gateway.create_session(&invoice, payer).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(
                    gateway = %gateway_name,
                    invoice_id = %invoice.id,
                    error = %e,
                    "Failed to create payment session"
                );
                return Err(e);
            }
        };

        let session = GatewaySession::pending(handle, Utc::now());
        let stored = self
            .invoice_repo
            .open_gateway_session(&invoice.id, gateway_name, session)
            .await?;

        info!(
            gateway = %gateway_name,
            invoice_id = %invoice.id,
            reference = %stored.reference,
            "Payment session opened"
        );

        Ok(stored)
    }

    /// Redirect that resumes the active session's payment UI
    pub async fn checkout(&self, invoice_id: &str, gateway_name: &str) -> Result<CheckoutRedirect> {
        self.get_gateway(gateway_name)?;
        let invoice = self.load_invoice(invoice_id).await?;

        invoice
            .active_session(gateway_name)
            .map(|session| session.checkout.clone())
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "No active {} session for invoice {}",
                    gateway_name, invoice_id
                ))
            })
    }

    /// Ask the gateway about the latest session; read-only
    pub async fn session_status(&self, invoice_id: &str, gateway_name: &str) -> Result<GatewayStatus> {
        let gateway = self.get_gateway(gateway_name)?;
        let invoice = self.load_invoice(invoice_id).await?;

        let session = invoice.gateway_sessions.get(gateway_name).ok_or_else(|| {
            AppError::not_found(format!(
                "No {} session for invoice {}",
                gateway_name, invoice_id
            ))
        })?;

        gateway.query_status(&session.reference).await
    }

    /// Authenticate an inbound webhook for the named gateway
    pub fn verify_webhook(
        &self,
        gateway_name: &str,
        payload: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<VerifiedEvent> {
        self.get_gateway(gateway_name)?
            .verify_webhook(payload, headers)
    }

    async fn load_invoice(&self, invoice_id: &str) -> Result<Invoice> {
        self.invoice_repo
            .find_by_id(invoice_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Invoice {} not found", invoice_id)))
    }

    fn validate_payer(payer: &Payer) -> Result<()> {
        if payer.name.trim().is_empty() {
            return Err(AppError::validation("Payer name cannot be empty"));
        }

        if !payer.email.contains('@') {
            return Err(AppError::validation("Payer email is invalid"));
        }

        Ok(())
    }
}

/// Gateway information for listing
#[derive(Debug, Clone, Serialize)]
pub struct GatewayInfo {
    pub name: String,
    pub supported_currencies: Vec<Currency>,
    pub sandbox: bool,
}
