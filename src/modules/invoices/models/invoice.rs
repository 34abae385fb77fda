// Invoice: the root financial document.
//
// Money invariants:
//   total = sub_total + tax_total
//   payment_status is derived from (total - discount, credit) and only the
//   reconciliation path writes credit.
// Invoices are never physically deleted; `removed` hides them from reads.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::line_item::{CreateLineItemRequest, LineItem};
use crate::core::{AppError, Currency, Result};
use crate::modules::fiscal::models::{FiscalDocument, FiscalStatus};
use crate::modules::gateways::models::GatewaySession;

/// Settlement status derived from credit against the amount due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Partially,
    Paid,
}

impl PaymentStatus {
    /// Derive the status from amounts
    ///
    /// * `unpaid`    ⇔ credit ≤ 0
    /// * `paid`      ⇔ credit ≥ total − discount
    /// * `partially` ⇔ 0 < credit < total − discount
    pub fn derive(total: Decimal, discount: Decimal, credit: Decimal) -> Self {
        if credit <= Decimal::ZERO {
            PaymentStatus::Unpaid
        } else if credit >= total - discount {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partially
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partially => "partially",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Unpaid
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "partially" => Ok(PaymentStatus::Partially),
            "paid" => Ok(PaymentStatus::Paid),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

/// Represents an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique invoice ID (UUID)
    pub id: String,

    /// Sequential number within `year`, assigned by the store
    pub number: i64,
    pub year: i32,

    pub client_id: String,
    pub currency: Currency,
    pub items: Vec<LineItem>,

    /// Tax rate in percent applied to the sub total
    pub tax_rate: Decimal,
    pub sub_total: Decimal,
    pub tax_total: Decimal,
    pub discount: Decimal,

    /// sub_total + tax_total
    pub total: Decimal,

    /// Cumulative settled amount
    pub credit: Decimal,
    pub payment_status: PaymentStatus,

    pub notes: Option<String>,

    /// Created lazily by the fiscal state machine
    pub fiscal_document: Option<FiscalDocument>,

    /// Latest session per gateway name
    #[serde(default)]
    pub gateway_sessions: BTreeMap<String, GatewaySession>,

    /// Payment ids in creation order
    #[serde(default)]
    pub payments: Vec<String>,

    #[serde(default)]
    pub removed: bool,

    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for invoice creation
#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoiceRequest {
    pub client_id: String,
    pub currency: Currency,
    pub items: Vec<CreateLineItemRequest>,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Invoice as rendered by the API
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceResponse {
    #[serde(flatten)]
    pub invoice: Invoice,

    /// total − discount
    pub amount_due: Decimal,

    /// amount_due − credit, never negative
    pub balance: Decimal,

    /// Auxiliary fiscal label, e.g. "not yet sent"
    pub fiscal_badge: &'static str,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        let amount_due = invoice.amount_due();
        let balance = invoice.balance();
        let fiscal_badge = FiscalDocument::badge(invoice.fiscal_document.as_ref());
        Self {
            invoice,
            amount_due,
            balance,
            fiscal_badge,
        }
    }
}

impl Invoice {
    /// Build a new, unnumbered invoice from a creation request
    ///
    /// # Returns
    /// * `Result<Self>` - Validated invoice with computed totals; `number` is 0 until stored
    pub fn from_request(request: CreateInvoiceRequest) -> Result<Self> {
        Self::validate_client_id(&request.client_id)?;
        Self::validate_items(&request.items)?;
        Self::validate_tax_rate(request.tax_rate)?;

        let currency = request.currency;
        let items = request
            .items
            .into_iter()
            .map(|item| LineItem::new(item, currency))
            .collect::<Result<Vec<_>>>()?;

        let sub_total = currency.round(items.iter().map(|item| item.total).sum());
        let tax_total = currency.round(sub_total * request.tax_rate / Decimal::ONE_HUNDRED);
        let total = sub_total + tax_total;

        Self::validate_discount(request.discount, total, currency)?;

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            number: 0,
            year: now.year(),
            client_id: request.client_id.trim().to_string(),
            currency,
            items,
            tax_rate: request.tax_rate,
            sub_total,
            tax_total,
            discount: request.discount,
            total,
            credit: Decimal::ZERO,
            payment_status: PaymentStatus::Unpaid,
            notes: request.notes,
            fiscal_document: None,
            gateway_sessions: BTreeMap::new(),
            payments: Vec::new(),
            removed: false,
            created_by: request.created_by,
            created_at: now,
            updated_at: now,
        })
    }

    /// total − discount
    pub fn amount_due(&self) -> Decimal {
        self.total - self.discount
    }

    /// Outstanding balance, clamped at zero
    pub fn balance(&self) -> Decimal {
        (self.amount_due() - self.credit).max(Decimal::ZERO)
    }

    /// Add a settled amount and recompute the derived status
    pub fn apply_credit(&mut self, amount: Decimal) {
        self.credit += amount;
        self.refresh_payment_status();
    }

    pub fn refresh_payment_status(&mut self) {
        self.payment_status = PaymentStatus::derive(self.total, self.discount, self.credit);
    }

    pub fn fiscal_status(&self) -> Option<FiscalStatus> {
        self.fiscal_document.as_ref().map(|doc| doc.status)
    }

    /// Active (non-terminal) session for a gateway, if any
    pub fn active_session(&self, gateway: &str) -> Option<&GatewaySession> {
        self.gateway_sessions
            .get(gateway)
            .filter(|session| session.is_active())
    }

    // Validation methods

    fn validate_client_id(client_id: &str) -> Result<()> {
        if client_id.trim().is_empty() {
            return Err(AppError::validation("Client ID cannot be empty"));
        }

        Ok(())
    }

    fn validate_items(items: &[CreateLineItemRequest]) -> Result<()> {
        if items.is_empty() {
            return Err(AppError::validation(
                "Invoice must have at least one line item",
            ));
        }

        Ok(())
    }

    fn validate_tax_rate(tax_rate: Decimal) -> Result<()> {
        if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE_HUNDRED {
            return Err(AppError::validation(
                "Tax rate must be between 0 and 100 percent",
            ));
        }

        Ok(())
    }

    fn validate_discount(discount: Decimal, total: Decimal, currency: Currency) -> Result<()> {
        currency
            .validate_amount(discount)
            .map_err(|e| AppError::validation(format!("Discount: {}", e)))?;

        if discount > total {
            return Err(AppError::validation(format!(
                "Discount {} exceeds invoice total {}",
                discount, total
            )));
        }

        Ok(())
    }
}
