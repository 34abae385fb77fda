use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::core::error::AppError;
use crate::modules::fiscal::models::FiscalStatus;
use crate::modules::fiscal::services::FiscalService;
use crate::modules::invoices::models::{CreateInvoiceRequest, Invoice, InvoiceResponse};
use crate::modules::invoices::repositories::InvoiceRepository;
use crate::modules::payments::models::Payment;
use crate::modules::payments::repositories::PaymentRepository;

const MAX_PAGE_SIZE: i64 = 100;

/// How long create waits for the fiscal document before answering
const FISCAL_CREATE_BUDGET: Duration = Duration::from_secs(2);

/// Service for invoice business logic
///
/// Invoice persistence is the source of truth. Fiscal side effects run on
/// create and read, but their errors are logged and never change the
/// outcome of the invoice operation itself.
pub struct InvoiceService {
    invoice_repo: Arc<dyn InvoiceRepository>,
    payment_repo: Arc<dyn PaymentRepository>,
    fiscal: Arc<FiscalService>,
    fiscal_budget: Duration,
}

impl InvoiceService {
    pub fn new(
        invoice_repo: Arc<dyn InvoiceRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        fiscal: Arc<FiscalService>,
    ) -> Self {
        Self {
            invoice_repo,
            payment_repo,
            fiscal,
            fiscal_budget: FISCAL_CREATE_BUDGET,
        }
    }

    /// Bound the time create_invoice waits on the fiscal gateway
    pub fn with_fiscal_budget(mut self, budget: Duration) -> Self {
        self.fiscal_budget = budget;
        self
    }

    /// Create a new invoice and register its fiscal document
    ///
    /// The fiscal call runs on its own task. If it outlives the budget the
    /// invoice is returned without a document and the task keeps going; the
    /// document is stored when it completes, or retried on a later read.
    pub async fn create_invoice(
        &self,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceResponse, AppError> {
        let invoice = Invoice::from_request(request)?;
        let created = self.invoice_repo.create(&invoice).await?;

        info!(
            invoice_id = %created.id,
            number = created.number,
            year = created.year,
            total = %created.total,
            currency = %created.currency,
            "Invoice created"
        );

        let fiscal = self.fiscal.clone();
        let pending = created.clone();
        let task = tokio::spawn(async move {
            match fiscal.ensure_created(&pending).await {
                Ok(updated) => Some(updated),
                Err(e) => {
                    warn!(
                        invoice_id = %pending.id,
                        error = %e,
                        kind = e.kind(),
                        "Fiscal document creation failed, will retry on next read"
                    );
                    None
                }
            }
        });

        let invoice = match tokio::time::timeout(self.fiscal_budget, task).await {
            Ok(Ok(Some(updated))) => updated,
            Ok(Ok(None)) => created,
            Ok(Err(e)) => {
                warn!(invoice_id = %created.id, error = %e, "Fiscal document task aborted");
                created
            }
            Err(_) => {
                info!(
                    invoice_id = %created.id,
                    budget_ms = self.fiscal_budget.as_millis() as u64,
                    "Fiscal gateway slow, answering without document"
                );
                created
            }
        };

        Ok(InvoiceResponse::from(invoice))
    }

    /// Get invoice by ID, advancing a created fiscal document to validated
    pub async fn get_invoice(&self, id: &str) -> Result<InvoiceResponse, AppError> {
        let invoice = self.load(id).await?;

        if invoice.fiscal_status() != Some(FiscalStatus::Created) {
            return Ok(InvoiceResponse::from(invoice));
        }

        let invoice = match self.fiscal.ensure_validated(&invoice).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(
                    invoice_id = %invoice.id,
                    error = %e,
                    kind = e.kind(),
                    "Fiscal validation failed"
                );
                invoice
            }
        };

        Ok(InvoiceResponse::from(invoice))
    }

    /// List invoices, newest first
    pub async fn list_invoices(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InvoiceResponse>, AppError> {
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if offset < 0 {
            return Err(AppError::Validation("offset cannot be negative".to_string()));
        }

        let invoices = self.invoice_repo.list(limit, offset).await?;
        Ok(invoices.into_iter().map(InvoiceResponse::from).collect())
    }

    /// Soft remove; later reads are 404
    pub async fn remove_invoice(&self, id: &str) -> Result<(), AppError> {
        if !self.invoice_repo.soft_remove(id).await? {
            return Err(AppError::NotFound(format!("Invoice {} not found", id)));
        }

        info!(invoice_id = %id, "Invoice removed");
        Ok(())
    }

    /// Payment ledger of an invoice
    pub async fn payments(&self, id: &str) -> Result<Vec<Payment>, AppError> {
        let invoice = self.load(id).await?;
        self.payment_repo.find_by_invoice(&invoice.id).await
    }

    async fn load(&self, id: &str) -> Result<Invoice, AppError> {
        self.invoice_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Invoice {} not found", id)))
    }
}
