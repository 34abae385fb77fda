// InvoiceRepository: record-store boundary for invoices.
//
// Implements:
// - Create invoice with a per-year sequential number (transactional)
// - Read invoice by ID (soft-removed rows excluded)
// - List invoices with pagination
// - Soft remove
// - Compare-and-set of the fiscal document on its stored status
// - Open / settle gateway sessions (at most one active per gateway)

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::types::Json;
use sqlx::{MySql, MySqlPool, Row, Transaction};

use crate::core::{AppError, Result};
use crate::modules::fiscal::models::{FiscalDocument, FiscalStatus};
use crate::modules::gateways::models::{GatewaySession, SessionStatus};
use crate::modules::invoices::models::{Invoice, LineItem, PaymentStatus};

/// Repository for invoice records
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Persist a new invoice, assigning its sequential number within its year
    async fn create(&self, invoice: &Invoice) -> Result<Invoice>;

    /// Find a live (not removed) invoice
    async fn find_by_id(&self, id: &str) -> Result<Option<Invoice>>;

    /// List live invoices, newest first
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Invoice>>;

    /// Mark an invoice as removed. Returns false when it was not found.
    async fn soft_remove(&self, id: &str) -> Result<bool>;

    /// Replace the fiscal document only if its stored status still equals `expected`
    ///
    /// `expected = None` means no document may exist yet. Returns false when the
    /// stored status changed in the meantime.
    async fn compare_and_set_fiscal(
        &self,
        id: &str,
        expected: Option<FiscalStatus>,
        document: &FiscalDocument,
    ) -> Result<bool>;

    /// Live invoices whose fiscal document is in `status`
    async fn find_with_fiscal_status(&self, status: FiscalStatus, limit: i64) -> Result<Vec<Invoice>>;

    /// Store `session` for `gateway` unless an active one exists
    ///
    /// # Returns
    /// * The active session for the gateway (either the existing one or `session`)
    async fn open_gateway_session(
        &self,
        id: &str,
        gateway: &str,
        session: GatewaySession,
    ) -> Result<GatewaySession>;

    /// Move the gateway's pending session to a terminal status
    ///
    /// Returns false when the gateway has no pending session with `reference`.
    async fn settle_gateway_session(
        &self,
        id: &str,
        gateway: &str,
        reference: &str,
        status: SessionStatus,
        transaction_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}

pub(crate) const INVOICE_COLUMNS: &str = r#"
    id, number, year, client_id, currency, items, tax_rate, sub_total, tax_total,
    discount, total, credit, payment_status, notes, fiscal_document,
    gateway_sessions, payments, removed, created_by, created_at, updated_at
"#;

/// Map a full `invoices` row into the domain model
pub(crate) fn invoice_from_row(row: &MySqlRow) -> Result<Invoice> {
    let currency: String = row.try_get("currency")?;
    let payment_status: String = row.try_get("payment_status")?;
    let items: Json<Vec<LineItem>> = row.try_get("items")?;
    let fiscal_document: Option<Json<FiscalDocument>> = row.try_get("fiscal_document")?;
    let gateway_sessions: Json<BTreeMap<String, GatewaySession>> =
        row.try_get("gateway_sessions")?;
    let payments: Json<Vec<String>> = row.try_get("payments")?;

    Ok(Invoice {
        id: row.try_get("id")?,
        number: row.try_get("number")?,
        year: row.try_get("year")?,
        client_id: row.try_get("client_id")?,
        currency: currency.parse().map_err(AppError::internal)?,
        items: items.0,
        tax_rate: row.try_get("tax_rate")?,
        sub_total: row.try_get("sub_total")?,
        tax_total: row.try_get("tax_total")?,
        discount: row.try_get("discount")?,
        total: row.try_get("total")?,
        credit: row.try_get("credit")?,
        payment_status: payment_status
            .parse::<PaymentStatus>()
            .map_err(AppError::internal)?,
        notes: row.try_get("notes")?,
        fiscal_document: fiscal_document.map(|doc| doc.0),
        gateway_sessions: gateway_sessions.0,
        payments: payments.0,
        removed: row.try_get("removed")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Lock a live invoice row for the rest of the transaction
pub(crate) async fn lock_invoice(
    tx: &mut Transaction<'_, MySql>,
    id: &str,
) -> Result<Option<Invoice>> {
    let sql = format!(
        "SELECT {} FROM invoices WHERE id = ? AND removed = FALSE FOR UPDATE",
        INVOICE_COLUMNS
    );

    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to lock invoice: {}", e)))?;

    row.as_ref().map(invoice_from_row).transpose()
}

/// MySQL-backed invoice repository
pub struct MySqlInvoiceRepository {
    pool: MySqlPool,
}

impl MySqlInvoiceRepository {
    /// Create a new invoice repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn write_sessions(
        tx: &mut Transaction<'_, MySql>,
        id: &str,
        sessions: &BTreeMap<String, GatewaySession>,
    ) -> Result<()> {
        sqlx::query("UPDATE invoices SET gateway_sessions = ?, updated_at = ? WHERE id = ?")
            .bind(Json(sessions))
            .bind(Utc::now())
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to update gateway sessions: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl InvoiceRepository for MySqlInvoiceRepository {
    async fn create(&self, invoice: &Invoice) -> Result<Invoice> {
        let mut tx = self.pool.begin().await?;

        // The counter row stays locked until commit, serializing numbering
        // within the year
        sqlx::query(
            r#"
            INSERT INTO invoice_sequences (year, last_number)
            VALUES (?, LAST_INSERT_ID(1))
            ON DUPLICATE KEY UPDATE last_number = LAST_INSERT_ID(last_number + 1)
            "#,
        )
        .bind(invoice.year)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to allocate invoice number: {}", e)))?;

        let next: i64 = sqlx::query_scalar("SELECT CAST(LAST_INSERT_ID() AS SIGNED)")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read invoice number: {}", e)))?;

        let mut created = invoice.clone();
        created.number = next;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, number, year, client_id, currency, items, tax_rate, sub_total,
                tax_total, discount, total, credit, payment_status, notes,
                fiscal_status, fiscal_document, gateway_sessions, payments, removed,
                created_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&created.id)
        .bind(created.number)
        .bind(created.year)
        .bind(&created.client_id)
        .bind(created.currency.to_string())
        .bind(Json(&created.items))
        .bind(created.tax_rate)
        .bind(created.sub_total)
        .bind(created.tax_total)
        .bind(created.discount)
        .bind(created.total)
        .bind(created.credit)
        .bind(created.payment_status.as_str())
        .bind(&created.notes)
        .bind(created.fiscal_status().map(|s| s.as_str()))
        .bind(created.fiscal_document.as_ref().map(Json))
        .bind(Json(&created.gateway_sessions))
        .bind(Json(&created.payments))
        .bind(created.removed)
        .bind(&created.created_by)
        .bind(created.created_at)
        .bind(created.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create invoice: {}", e)))?;

        tx.commit().await?;

        Ok(created)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE id = ? AND removed = FALSE",
            INVOICE_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to fetch invoice: {}", e)))?;

        row.as_ref().map(invoice_from_row).transpose()
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE removed = FALSE ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
            INVOICE_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to list invoices: {}", e)))?;

        rows.iter().map(invoice_from_row).collect()
    }

    async fn soft_remove(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE invoices SET removed = TRUE, updated_at = ? WHERE id = ? AND removed = FALSE",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to remove invoice: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn compare_and_set_fiscal(
        &self,
        id: &str,
        expected: Option<FiscalStatus>,
        document: &FiscalDocument,
    ) -> Result<bool> {
        // <=> is NULL-safe, so `expected = None` matches an absent document
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET fiscal_document = ?, fiscal_status = ?, updated_at = ?
            WHERE id = ? AND removed = FALSE AND fiscal_status <=> ?
            "#,
        )
        .bind(Json(document))
        .bind(document.status.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(expected.map(|s| s.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to update fiscal document: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_with_fiscal_status(&self, status: FiscalStatus, limit: i64) -> Result<Vec<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE fiscal_status = ? AND removed = FALSE ORDER BY updated_at LIMIT ?",
            INVOICE_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to query fiscal backlog: {}", e)))?;

        rows.iter().map(invoice_from_row).collect()
    }

    async fn open_gateway_session(
        &self,
        id: &str,
        gateway: &str,
        session: GatewaySession,
    ) -> Result<GatewaySession> {
        let mut tx = self.pool.begin().await?;

        let mut invoice = lock_invoice(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Invoice {} not found", id)))?;

        if let Some(active) = invoice.active_session(gateway) {
            let active = active.clone();
            tx.rollback().await?;
            return Ok(active);
        }

        invoice
            .gateway_sessions
            .insert(gateway.to_string(), session.clone());
        Self::write_sessions(&mut tx, id, &invoice.gateway_sessions).await?;

        tx.commit().await?;

        Ok(session)
    }

    async fn settle_gateway_session(
        &self,
        id: &str,
        gateway: &str,
        reference: &str,
        status: SessionStatus,
        transaction_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let mut invoice = lock_invoice(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Invoice {} not found", id)))?;

        let settled = match invoice.gateway_sessions.get_mut(gateway) {
            Some(session) => session.settle(reference, status, transaction_id, at),
            None => false,
        };

        if !settled {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::write_sessions(&mut tx, id, &invoice.gateway_sessions).await?;
        tx.commit().await?;

        Ok(true)
    }
}
