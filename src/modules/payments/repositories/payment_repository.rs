// PaymentRepository: append-only payment ledger.
//
// record_payment is the only writer of invoice credit. In one unit it:
//   1. inserts the payment (UNIQUE (gateway, ref) detects replays)
//   2. adds the amount to credit with a single atomic add
//   3. recomputes payment_status in the same statement
//   4. appends the payment id and completes the gateway session

use async_trait::async_trait;
use chrono::Utc;
use sqlx::mysql::MySqlRow;
use sqlx::types::Json;
use sqlx::{MySqlPool, Row};

use crate::core::{AppError, Result};
use crate::modules::gateways::models::SessionStatus;
use crate::modules::invoices::models::Invoice;
use crate::modules::invoices::repositories::invoice_repository::{
    invoice_from_row, lock_invoice, INVOICE_COLUMNS,
};
use crate::modules::payments::models::{NewPayment, Payment};

/// Repository for payment ledger entries
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Record a payment and credit its invoice atomically
    ///
    /// # Returns
    /// * `Result<(Payment, Invoice)>` - Stored payment and the invoice after credit
    ///
    /// # Errors
    /// * `DuplicateTransaction` - `(gateway, reference)` was already recorded; nothing changed
    /// * `NotFound` - invoice missing or removed
    async fn record_payment(&self, payment: NewPayment) -> Result<(Payment, Invoice)>;

    /// Find a payment by its exactly-once key
    async fn find_by_reference(&self, gateway: &str, reference: &str) -> Result<Option<Payment>>;

    /// Payments of an invoice in creation order
    async fn find_by_invoice(&self, invoice_id: &str) -> Result<Vec<Payment>>;
}

const PAYMENT_COLUMNS: &str = r#"
    id, number, client_id, invoice_id, amount, currency, payment_mode_id,
    gateway, ref, date, created_by, created_at
"#;

fn payment_from_row(row: &MySqlRow) -> Result<Payment> {
    let currency: String = row.try_get("currency")?;

    Ok(Payment {
        id: row.try_get("id")?,
        number: row.try_get("number")?,
        client_id: row.try_get("client_id")?,
        invoice_id: row.try_get("invoice_id")?,
        amount: row.try_get("amount")?,
        currency: currency.parse().map_err(AppError::internal)?,
        payment_mode_id: row.try_get("payment_mode_id")?,
        gateway: row.try_get("gateway")?,
        reference: row.try_get("ref")?,
        date: row.try_get("date")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

/// MySQL-backed payment repository
pub struct MySqlPaymentRepository {
    pool: MySqlPool,
}

impl MySqlPaymentRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for MySqlPaymentRepository {
    async fn record_payment(&self, payment: NewPayment) -> Result<(Payment, Invoice)> {
        let mut tx = self.pool.begin().await?;

        let invoice = lock_invoice(&mut tx, &payment.invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("Invoice {} not found", payment.invoice_id))
            })?;

        let created_at = Utc::now();

        let inserted = sqlx::query(
            r#"
            INSERT INTO payments (
                id, client_id, invoice_id, amount, currency, payment_mode_id,
                gateway, ref, date, created_by, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&payment.id)
        .bind(&invoice.client_id)
        .bind(&payment.invoice_id)
        .bind(payment.amount)
        .bind(payment.currency.to_string())
        .bind(&payment.payment_mode_id)
        .bind(&payment.gateway)
        .bind(&payment.reference)
        .bind(payment.date)
        .bind(&payment.created_by)
        .bind(created_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            let duplicate = e
                .as_database_error()
                .map(|db_err| db_err.is_unique_violation())
                .unwrap_or(false);
            tx.rollback().await?;

            if duplicate {
                return Err(AppError::DuplicateTransaction(format!(
                    "{}:{}",
                    payment.gateway, payment.reference
                )));
            }
            return Err(AppError::Internal(format!("Failed to record payment: {}", e)));
        }

        let number: i64 = sqlx::query_scalar("SELECT number FROM payments WHERE id = ?")
            .bind(&payment.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read payment number: {}", e)))?;

        let mut sessions = invoice.gateway_sessions.clone();
        if let (Some(reference), Some(session)) = (
            payment.session_reference.as_deref(),
            sessions.get_mut(&payment.gateway),
        ) {
            session.settle(
                reference,
                SessionStatus::Completed,
                Some(&payment.reference),
                created_at,
            );
        }

        // Assignments run left to right, so the CASE sees the new credit
        sqlx::query(
            r#"
            UPDATE invoices
            SET credit = credit + ?,
                payment_status = CASE
                    WHEN credit <= 0 THEN 'unpaid'
                    WHEN credit >= total - discount THEN 'paid'
                    ELSE 'partially'
                END,
                payments = JSON_ARRAY_APPEND(payments, '$', ?),
                gateway_sessions = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(payment.amount)
        .bind(&payment.id)
        .bind(Json(&sessions))
        .bind(created_at)
        .bind(&payment.invoice_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to credit invoice: {}", e)))?;

        let sql = format!("SELECT {} FROM invoices WHERE id = ?", INVOICE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(&payment.invoice_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to reload invoice: {}", e)))?;
        let updated = invoice_from_row(&row)?;

        tx.commit().await?;

        let client_id = updated.client_id.clone();
        Ok((payment.into_payment(number, client_id, created_at), updated))
    }

    async fn find_by_reference(&self, gateway: &str, reference: &str) -> Result<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE gateway = ? AND ref = ?",
            PAYMENT_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(gateway)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to fetch payment: {}", e)))?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn find_by_invoice(&self, invoice_id: &str) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE invoice_id = ? ORDER BY number",
            PAYMENT_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to list payments: {}", e)))?;

        rows.iter().map(payment_from_row).collect()
    }
}
