// Fiscal document state machine.
//
// Legal path: absent -> created -> validated -> sent -> {accepted | rejected | cancelled}
//
// Every write is a compare-and-set on the stored status. Losing the race is a
// no-op for the ensure_* operations and a StateConflict for explicit commands.
// Adapter errors are returned unchanged; the orchestrator decides what to
// swallow.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use super::fiscal_gateway::FiscalGateway;
use crate::core::{AppError, Result};
use crate::modules::fiscal::models::{FiscalDocument, FiscalStatus};
use crate::modules::invoices::models::Invoice;
use crate::modules::invoices::repositories::InvoiceRepository;

/// Downloadable fiscal artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Xml,
}

impl DocumentKind {
    pub fn content_type(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Xml => "application/xml",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Xml => "xml",
        }
    }
}

pub struct FiscalService {
    gateway: Arc<dyn FiscalGateway>,
    invoice_repo: Arc<dyn InvoiceRepository>,
}

impl FiscalService {
    pub fn new(gateway: Arc<dyn FiscalGateway>, invoice_repo: Arc<dyn InvoiceRepository>) -> Self {
        Self {
            gateway,
            invoice_repo,
        }
    }

    pub fn is_sandbox(&self) -> bool {
        self.gateway.is_sandbox()
    }

    /// Register the invoice with the tax authority unless a document exists
    ///
    /// # Returns
    /// * `Result<Invoice>` - The invoice as stored after the attempt
    pub async fn ensure_created(&self, invoice: &Invoice) -> Result<Invoice> {
        if invoice.fiscal_document.is_some() {
            return Ok(invoice.clone());
        }

        let created = self.gateway.create_document(invoice).await?;
        let document = FiscalDocument::created(
            created.external_id,
            created.sandbox,
            created.warning,
            created.raw,
            Utc::now(),
        );

        if self
            .invoice_repo
            .compare_and_set_fiscal(&invoice.id, None, &document)
            .await?
        {
            info!(
                invoice_id = %invoice.id,
                external_id = %document.external_id,
                sandbox = document.sandbox,
                "Fiscal document created"
            );
            let mut updated = invoice.clone();
            updated.fiscal_document = Some(document);
            return Ok(updated);
        }

        warn!(
            invoice_id = %invoice.id,
            external_id = %document.external_id,
            "Fiscal document already created concurrently; discarding duplicate"
        );
        self.reload(&invoice.id).await
    }

    /// Advance `created` to `validated`; no-op in any other state
    pub async fn ensure_validated(&self, invoice: &Invoice) -> Result<Invoice> {
        let Some(mut document) = invoice.fiscal_document.clone() else {
            return Ok(invoice.clone());
        };
        if document.status != FiscalStatus::Created {
            return Ok(invoice.clone());
        }

        let validated = self.gateway.validate_document(&document.external_id).await?;
        if validated.status != FiscalStatus::Validated {
            info!(
                invoice_id = %invoice.id,
                external_id = %document.external_id,
                remote_status = %validated.status,
                "Fiscal document not validated yet"
            );
            return Ok(invoice.clone());
        }

        document.transition(FiscalStatus::Validated, Utc::now(), validated.raw)?;
        document.cufe = validated.cufe;

        if self
            .invoice_repo
            .compare_and_set_fiscal(&invoice.id, Some(FiscalStatus::Created), &document)
            .await?
        {
            info!(
                invoice_id = %invoice.id,
                external_id = %document.external_id,
                "Fiscal document validated"
            );
            let mut updated = invoice.clone();
            updated.fiscal_document = Some(document);
            return Ok(updated);
        }

        self.reload(&invoice.id).await
    }

    /// Submit a validated document to the tax authority
    ///
    /// # Errors
    /// * `StateConflict` - document not `validated`, or the gateway answered
    ///   with anything but `sent`; the stored document is left unchanged
    pub async fn send(&self, invoice_id: &str) -> Result<Invoice> {
        let invoice = self.reload(invoice_id).await?;
        let mut document = Self::require_status(&invoice, FiscalStatus::Validated, "send")?;

        let sent = self.gateway.send_document(&document.external_id).await?;
        if sent.status != FiscalStatus::Sent {
            warn!(
                invoice_id = %invoice.id,
                external_id = %document.external_id,
                remote_status = %sent.status,
                "Fiscal gateway did not accept the document for sending"
            );
            return Err(AppError::conflict(format!(
                "Fiscal gateway did not send the document, it reported '{}'",
                sent.status
            )));
        }

        document.transition(FiscalStatus::Sent, Utc::now(), sent.raw)?;

        self.commit(invoice, FiscalStatus::Validated, document).await
    }

    /// Pull the tax authority's verdict for a sent document
    ///
    /// A still-`sent` answer leaves the document untouched.
    pub async fn refresh(&self, invoice_id: &str) -> Result<Invoice> {
        let invoice = self.reload(invoice_id).await?;
        let mut document = Self::require_status(&invoice, FiscalStatus::Sent, "refresh")?;

        let fetched = self
            .gateway
            .fetch_document(&document.external_id, false)
            .await?;

        match fetched.status {
            FiscalStatus::Accepted | FiscalStatus::Cancelled => {
                document.transition(fetched.status, Utc::now(), fetched.raw)?;
            }
            FiscalStatus::Rejected => {
                document.transition(FiscalStatus::Rejected, Utc::now(), fetched.raw)?;
                document.rejected_reason = fetched.rejected_reason;
            }
            _ => return Ok(invoice),
        }

        self.commit(invoice, FiscalStatus::Sent, document).await
    }

    /// Cancel a sent document
    ///
    /// # Errors
    /// * `Validation` - blank reason
    /// * `StateConflict` - document absent or not `sent`
    pub async fn cancel(&self, invoice_id: &str, reason: &str) -> Result<Invoice> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::validation("Cancellation reason cannot be empty"));
        }

        let invoice = self.reload(invoice_id).await?;
        let mut document = Self::require_status(&invoice, FiscalStatus::Sent, "cancel")?;

        let cancelled = self
            .gateway
            .cancel_document(&document.external_id, reason)
            .await?;
        if cancelled.status != FiscalStatus::Cancelled {
            return Err(AppError::conflict(format!(
                "Fiscal gateway refused cancellation, document is '{}'",
                cancelled.status
            )));
        }

        document.transition(FiscalStatus::Cancelled, Utc::now(), cancelled.raw)?;
        document.cancelled_reason = Some(reason.to_string());

        self.commit(invoice, FiscalStatus::Sent, document).await
    }

    /// Fetch the PDF or XML representation of the invoice's document
    pub async fn download(&self, invoice_id: &str, kind: DocumentKind) -> Result<Vec<u8>> {
        let invoice = self.reload(invoice_id).await?;
        let document = invoice.fiscal_document.ok_or_else(|| {
            AppError::not_found(format!("Invoice {} has no fiscal document", invoice_id))
        })?;

        let fetched = self
            .gateway
            .fetch_document(&document.external_id, true)
            .await?;

        let bytes = match kind {
            DocumentKind::Pdf => fetched.pdf,
            DocumentKind::Xml => fetched.xml,
        };

        bytes.ok_or_else(|| {
            AppError::not_found(format!(
                "Fiscal {} not available for invoice {}",
                kind.extension(),
                invoice_id
            ))
        })
    }

    async fn reload(&self, invoice_id: &str) -> Result<Invoice> {
        self.invoice_repo
            .find_by_id(invoice_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Invoice {} not found", invoice_id)))
    }

    fn require_status(
        invoice: &Invoice,
        expected: FiscalStatus,
        operation: &str,
    ) -> Result<FiscalDocument> {
        match &invoice.fiscal_document {
            Some(document) if document.status == expected => Ok(document.clone()),
            Some(document) => Err(AppError::conflict(format!(
                "Cannot {} fiscal document of invoice {} in status '{}'",
                operation, invoice.id, document.status
            ))),
            None => Err(AppError::conflict(format!(
                "Cannot {} invoice {}: no fiscal document",
                operation, invoice.id
            ))),
        }
    }

    async fn commit(
        &self,
        mut invoice: Invoice,
        expected: FiscalStatus,
        document: FiscalDocument,
    ) -> Result<Invoice> {
        if !self
            .invoice_repo
            .compare_and_set_fiscal(&invoice.id, Some(expected), &document)
            .await?
        {
            return Err(AppError::conflict(format!(
                "Fiscal document of invoice {} changed concurrently",
                invoice.id
            )));
        }

        info!(
            invoice_id = %invoice.id,
            external_id = %document.external_id,
            status = %document.status,
            "Fiscal document transitioned"
        );

        invoice.fiscal_document = Some(document);
        Ok(invoice)
    }
}
