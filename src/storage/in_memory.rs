use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::{AppError, Result};
use crate::modules::fiscal::models::{FiscalDocument, FiscalStatus};
use crate::modules::gateways::models::{GatewaySession, SessionStatus};
use crate::modules::invoices::models::Invoice;
use crate::modules::invoices::repositories::InvoiceRepository;
use crate::modules::payments::models::{NewPayment, Payment, PaymentMode};
use crate::modules::payments::repositories::{PaymentModeRepository, PaymentRepository};

#[derive(Debug, Default)]
struct State {
    invoices: HashMap<String, Invoice>,
    /// Ledger in number order
    payments: Vec<Payment>,
    /// (gateway, ref) -> index into `payments`
    payment_keys: HashMap<(String, String), usize>,
    payment_modes: HashMap<String, PaymentMode>,
    last_number_by_year: HashMap<i32, i64>,
}

/// In-memory record store implementing every repository trait.
///
/// Used by tests and when no database is configured. A single lock guards
/// each multi-record operation, giving the same atomicity as the SQL
/// transaction in the MySQL repositories.
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<State>,
    available: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            state: RwLock::new(State::default()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the data store going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Total number of ledger entries
    pub fn payment_count(&self) -> usize {
        self.state.read().map(|s| s.payments.len()).unwrap_or(0)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::transient("Data store unavailable"))
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.check_available()?;
        self.state
            .read()
            .map_err(|_| AppError::internal("In-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.check_available()?;
        self.state
            .write()
            .map_err(|_| AppError::internal("In-memory store lock poisoned"))
    }

    fn live_mut<'a>(state: &'a mut State, id: &str) -> Result<&'a mut Invoice> {
        state
            .invoices
            .get_mut(id)
            .filter(|invoice| !invoice.removed)
            .ok_or_else(|| AppError::not_found(format!("Invoice {} not found", id)))
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryStore {
    async fn create(&self, invoice: &Invoice) -> Result<Invoice> {
        let mut state = self.write()?;

        let last = state.last_number_by_year.entry(invoice.year).or_insert(0);
        *last += 1;

        let mut created = invoice.clone();
        created.number = *last;
        state.invoices.insert(created.id.clone(), created.clone());

        Ok(created)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Invoice>> {
        let state = self.read()?;
        Ok(state.invoices.get(id).filter(|i| !i.removed).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Invoice>> {
        let state = self.read()?;

        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| !i.removed)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.number.cmp(&a.number))
        });

        Ok(invoices
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn soft_remove(&self, id: &str) -> Result<bool> {
        let mut state = self.write()?;

        match state.invoices.get_mut(id) {
            Some(invoice) if !invoice.removed => {
                invoice.removed = true;
                invoice.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_set_fiscal(
        &self,
        id: &str,
        expected: Option<FiscalStatus>,
        document: &FiscalDocument,
    ) -> Result<bool> {
        let mut state = self.write()?;

        let Some(invoice) = state.invoices.get_mut(id).filter(|i| !i.removed) else {
            return Ok(false);
        };

        if invoice.fiscal_status() != expected {
            return Ok(false);
        }

        invoice.fiscal_document = Some(document.clone());
        invoice.updated_at = Utc::now();
        Ok(true)
    }

    async fn find_with_fiscal_status(&self, status: FiscalStatus, limit: i64) -> Result<Vec<Invoice>> {
        let state = self.read()?;

        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| !i.removed && i.fiscal_status() == Some(status))
            .cloned()
            .collect();
        invoices.sort_by_key(|i| i.updated_at);
        invoices.truncate(limit.max(0) as usize);

        Ok(invoices)
    }

    async fn open_gateway_session(
        &self,
        id: &str,
        gateway: &str,
        session: GatewaySession,
    ) -> Result<GatewaySession> {
        let mut state = self.write()?;
        let invoice = Self::live_mut(&mut state, id)?;

        if let Some(active) = invoice.active_session(gateway) {
            return Ok(active.clone());
        }

        invoice
            .gateway_sessions
            .insert(gateway.to_string(), session.clone());
        invoice.updated_at = Utc::now();

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
        let mut state = self.write()?;
        let invoice = Self::live_mut(&mut state, id)?;

        let settled = match invoice.gateway_sessions.get_mut(gateway) {
            Some(session) => session.settle(reference, status, transaction_id, at),
            None => false,
        };
        if settled {
            invoice.updated_at = at;
        }

        Ok(settled)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn record_payment(&self, payment: NewPayment) -> Result<(Payment, Invoice)> {
        let mut state = self.write()?;

        let key = (payment.gateway.clone(), payment.reference.clone());
        if state.payment_keys.contains_key(&key) {
            return Err(AppError::DuplicateTransaction(format!(
                "{}:{}",
                payment.gateway, payment.reference
            )));
        }

        let created_at = Utc::now();
        let number = state.payments.len() as i64 + 1;

        let invoice = Self::live_mut(&mut state, &payment.invoice_id)?;
        invoice.apply_credit(payment.amount);
        invoice.payments.push(payment.id.clone());
        if let (Some(reference), Some(session)) = (
            payment.session_reference.as_deref(),
            invoice.gateway_sessions.get_mut(&payment.gateway),
        ) {
            session.settle(
                reference,
                SessionStatus::Completed,
                Some(&payment.reference),
                created_at,
            );
        }
        invoice.updated_at = created_at;

        let client_id = invoice.client_id.clone();
        let updated = invoice.clone();

        let stored = payment.into_payment(number, client_id, created_at);
        let idx = state.payments.len();
        state.payment_keys.insert(key, idx);
        state.payments.push(stored.clone());

        Ok((stored, updated))
    }

    async fn find_by_reference(&self, gateway: &str, reference: &str) -> Result<Option<Payment>> {
        let state = self.read()?;

        Ok(state
            .payment_keys
            .get(&(gateway.to_string(), reference.to_string()))
            .and_then(|idx| state.payments.get(*idx))
            .cloned())
    }

    async fn find_by_invoice(&self, invoice_id: &str) -> Result<Vec<Payment>> {
        let state = self.read()?;

        Ok(state
            .payments
            .iter()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentModeRepository for InMemoryStore {
    async fn find_or_create(&self, name: &str) -> Result<PaymentMode> {
        let mut state = self.write()?;

        Ok(state
            .payment_modes
            .entry(name.to_string())
            .or_insert_with(|| PaymentMode::for_gateway(name))
            .clone())
    }
}
