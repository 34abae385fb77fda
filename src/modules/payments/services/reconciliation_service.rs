use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::{AppError, Result};
use crate::modules::gateways::models::SessionStatus;
use crate::modules::gateways::services::{PaymentOutcome, VerifiedEvent};
use crate::modules::invoices::models::PaymentStatus;
use crate::modules::invoices::repositories::InvoiceRepository;
use crate::modules::payments::models::NewPayment;
use crate::modules::payments::repositories::{PaymentModeRepository, PaymentRepository};

/// What applying one verified event did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ReconciliationOutcome {
    /// A payment was recorded and credited
    Applied {
        payment_id: String,
        invoice_id: String,
        amount: Decimal,
        credit: Decimal,
        payment_status: PaymentStatus,
    },
    /// The transaction was already recorded; nothing changed
    Duplicate {
        payment_id: Option<String>,
        invoice_id: String,
    },
    /// Failed or cancelled attempt recorded on the session only
    Recorded {
        invoice_id: String,
        session_status: SessionStatus,
        updated: bool,
    },
    /// Pending events are informational
    Ignored { invoice_id: String },
}

/// Applies verified gateway events to invoices exactly once
pub struct ReconciliationService {
    invoice_repo: Arc<dyn InvoiceRepository>,
    payment_repo: Arc<dyn PaymentRepository>,
    mode_repo: Arc<dyn PaymentModeRepository>,
}

impl ReconciliationService {
    pub fn new(
        invoice_repo: Arc<dyn InvoiceRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        mode_repo: Arc<dyn PaymentModeRepository>,
    ) -> Self {
        Self {
            invoice_repo,
            payment_repo,
            mode_repo,
        }
    }

    /// Apply one verified event
    ///
    /// Replays of a recorded `(gateway, transaction_id)` are reported as
    /// `Duplicate`, including concurrent deliveries that lose the insert race.
    ///
    /// # Errors
    /// * `NotFound` - unknown or removed invoice; no mutation
    /// * `Validation` - event currency differs from the invoice currency
    /// * `TransientGateway` / `Database` - store unavailable, the gateway should retry
    pub async fn apply(&self, event: VerifiedEvent) -> Result<ReconciliationOutcome> {
        let invoice = self
            .invoice_repo
            .find_by_id(&event.invoice_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Invoice {} not found", event.invoice_id)))?;

        match event.outcome {
            PaymentOutcome::Pending => {
                info!(
                    gateway = %event.gateway,
                    invoice_id = %invoice.id,
                    external_status = %event.external_status,
                    "Pending payment event ignored"
                );
                Ok(ReconciliationOutcome::Ignored {
                    invoice_id: invoice.id,
                })
            }
            PaymentOutcome::Failed | PaymentOutcome::Cancelled => {
                let status = if event.outcome == PaymentOutcome::Failed {
                    SessionStatus::Failed
                } else {
                    SessionStatus::Cancelled
                };

                // Only the session the event names may be settled; a late
                // failure of an earlier attempt must not close a newer one
                let updated = match event.session_reference.as_deref() {
                    Some(reference) => {
                        self.invoice_repo
                            .settle_gateway_session(
                                &invoice.id,
                                &event.gateway,
                                reference,
                                status,
                                Some(&event.transaction_id),
                                Utc::now(),
                            )
                            .await?
                    }
                    None => {
                        warn!(
                            gateway = %event.gateway,
                            invoice_id = %invoice.id,
                            transaction_id = %event.transaction_id,
                            "Event names no session, leaving sessions untouched"
                        );
                        false
                    }
                };

                info!(
                    gateway = %event.gateway,
                    invoice_id = %invoice.id,
                    session_status = %status,
                    updated,
                    "Unsuccessful payment attempt recorded"
                );

                Ok(ReconciliationOutcome::Recorded {
                    invoice_id: invoice.id,
                    session_status: status,
                    updated,
                })
            }
            PaymentOutcome::Completed => {
                // Fast path only; the unique key is what guarantees exactly-once
                if let Some(existing) = self
                    .payment_repo
                    .find_by_reference(&event.gateway, &event.transaction_id)
                    .await?
                {
                    info!(
                        gateway = %event.gateway,
                        transaction_id = %event.transaction_id,
                        payment_id = %existing.id,
                        "Transaction already recorded"
                    );
                    return Ok(ReconciliationOutcome::Duplicate {
                        payment_id: Some(existing.id),
                        invoice_id: invoice.id,
                    });
                }

                let currency = event.currency.unwrap_or(invoice.currency);
                if currency != invoice.currency {
                    warn!(
                        gateway = %event.gateway,
                        invoice_id = %invoice.id,
                        event_currency = %currency,
                        invoice_currency = %invoice.currency,
                        "Payment currency mismatch"
                    );
                    return Err(AppError::validation(format!(
                        "Payment currency '{}' does not match invoice currency '{}'",
                        currency, invoice.currency
                    )));
                }

                let mode = self.mode_repo.find_or_create(&event.gateway).await?;
                let payment = NewPayment::new(
                    &invoice.id,
                    &event.gateway,
                    &event.transaction_id,
                    event.amount,
                    currency,
                    mode.id,
                )?
                .created_by(webhook_author(&event.gateway))
                .for_session(event.session_reference.clone());

                match self.payment_repo.record_payment(payment).await {
                    Ok((payment, updated)) => {
                        info!(
                            gateway = %event.gateway,
                            invoice_id = %updated.id,
                            payment_id = %payment.id,
                            amount = %payment.amount,
                            credit = %updated.credit,
                            payment_status = %updated.payment_status,
                            "Payment applied"
                        );

                        Ok(ReconciliationOutcome::Applied {
                            payment_id: payment.id,
                            invoice_id: updated.id,
                            amount: payment.amount,
                            credit: updated.credit,
                            payment_status: updated.payment_status,
                        })
                    }
                    Err(AppError::DuplicateTransaction(key)) => {
                        info!(
                            key = %key,
                            invoice_id = %invoice.id,
                            "Concurrent delivery lost the insert race"
                        );
                        let existing = self
                            .payment_repo
                            .find_by_reference(&event.gateway, &event.transaction_id)
                            .await?;

                        Ok(ReconciliationOutcome::Duplicate {
                            payment_id: existing.map(|p| p.id),
                            invoice_id: invoice.id,
                        })
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }
}

/// Author recorded on payments that arrive through a gateway notification
fn webhook_author(gateway: &str) -> String {
    format!("webhook:{}", gateway)
}
