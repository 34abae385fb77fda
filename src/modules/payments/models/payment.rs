use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{AppError, Currency, Result};

/// Immutable ledger entry for one settled gateway transaction
///
/// Unique per `(gateway, reference)`. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Unique payment ID (UUID)
    pub id: String,

    /// Globally sequential, assigned by the store
    pub number: i64,

    pub client_id: String,

    /// Owning invoice (lookup only)
    pub invoice_id: String,

    /// Settled amount, always > 0
    pub amount: Decimal,
    pub currency: Currency,

    pub payment_mode_id: String,

    /// Gateway name the transaction came through
    pub gateway: String,

    /// External transaction identifier
    #[serde(rename = "ref")]
    pub reference: String,

    pub date: DateTime<Utc>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payment about to be recorded
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: String,
    pub invoice_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub payment_mode_id: String,
    pub gateway: String,
    pub reference: String,
    pub date: DateTime<Utc>,
    pub created_by: Option<String>,
    /// Gateway session this payment completes, when known
    pub session_reference: Option<String>,
}

impl NewPayment {
    /// Build a validated payment request
    ///
    /// # Arguments
    /// * `invoice_id` - Invoice receiving the credit
    /// * `gateway` - Gateway name, part of the uniqueness key
    /// * `reference` - External transaction id, part of the uniqueness key
    /// * `amount` - Positive amount with the currency's precision
    pub fn new(
        invoice_id: impl Into<String>,
        gateway: impl Into<String>,
        reference: impl Into<String>,
        amount: Decimal,
        currency: Currency,
        payment_mode_id: impl Into<String>,
    ) -> Result<Self> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(AppError::validation("Transaction id cannot be empty"));
        }

        if amount <= Decimal::ZERO {
            return Err(AppError::validation(format!(
                "Payment amount must be positive, got {}",
                amount
            )));
        }

        currency
            .validate_amount(amount)
            .map_err(AppError::validation)?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            invoice_id: invoice_id.into(),
            amount,
            currency,
            payment_mode_id: payment_mode_id.into(),
            gateway: gateway.into(),
            reference,
            date: Utc::now(),
            created_by: None,
            session_reference: None,
        })
    }

    pub fn created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn for_session(mut self, reference: Option<String>) -> Self {
        self.session_reference = reference;
        self
    }

    /// Materialize the ledger entry once the store assigned a number
    pub fn into_payment(self, number: i64, client_id: String, created_at: DateTime<Utc>) -> Payment {
        Payment {
            id: self.id,
            number,
            client_id,
            invoice_id: self.invoice_id,
            amount: self.amount,
            currency: self.currency,
            payment_mode_id: self.payment_mode_id,
            gateway: self.gateway,
            reference: self.reference,
            date: self.date,
            created_by: self.created_by,
            created_at,
        }
    }
}
