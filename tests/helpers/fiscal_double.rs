// Scripted fiscal gateway
//
// Stands in for the tax authority so tests can force timeouts, missing
// credentials and specific verdicts without network access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use fiscalpay::core::{AppError, Result};
use fiscalpay::fiscal::services::{
    CancelledDocument, CreatedDocument, FetchedDocument, SentDocument, ValidatedDocument,
};
use fiscalpay::fiscal::{FiscalGateway, FiscalStatus};
use fiscalpay::invoices::Invoice;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiscalBehavior {
    Succeed,
    /// Every call fails with a transient error, like a timed-out request
    Timeout,
    /// Every call fails with a configuration error
    Unconfigured,
}

pub struct ScriptedFiscalGateway {
    behavior: Mutex<FiscalBehavior>,
    /// Status reported by validate_document
    validation: Mutex<FiscalStatus>,
    /// Status reported by fetch_document
    verdict: Mutex<FiscalStatus>,
    /// Status reported by send_document
    send_status: Mutex<FiscalStatus>,
    /// Latency added to create_document
    create_delay: Mutex<Duration>,
    creates: AtomicUsize,
    validations: AtomicUsize,
}

impl ScriptedFiscalGateway {
    pub fn new(behavior: FiscalBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            validation: Mutex::new(FiscalStatus::Validated),
            verdict: Mutex::new(FiscalStatus::Sent),
            send_status: Mutex::new(FiscalStatus::Sent),
            create_delay: Mutex::new(Duration::ZERO),
            creates: AtomicUsize::new(0),
            validations: AtomicUsize::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(FiscalBehavior::Succeed)
    }

    pub fn always_timeout() -> Self {
        Self::new(FiscalBehavior::Timeout)
    }

    pub fn unconfigured() -> Self {
        Self::new(FiscalBehavior::Unconfigured)
    }

    pub fn set_behavior(&self, behavior: FiscalBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn set_validation(&self, status: FiscalStatus) {
        *self.validation.lock().unwrap() = status;
    }

    pub fn set_verdict(&self, status: FiscalStatus) {
        *self.verdict.lock().unwrap() = status;
    }

    pub fn set_send_status(&self, status: FiscalStatus) {
        *self.send_status.lock().unwrap() = status;
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = delay;
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn validate_calls(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        match *self.behavior.lock().unwrap() {
            FiscalBehavior::Succeed => Ok(()),
            FiscalBehavior::Timeout => Err(AppError::transient("fiscal gateway: request timed out")),
            FiscalBehavior::Unconfigured => {
                Err(AppError::configuration("fiscal gateway credentials missing"))
            }
        }
    }
}

#[async_trait]
impl FiscalGateway for ScriptedFiscalGateway {
    fn is_sandbox(&self) -> bool {
        true
    }

    async fn create_document(&self, invoice: &Invoice) -> Result<CreatedDocument> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check()?;

        Ok(CreatedDocument {
            external_id: format!("DOC-{}", invoice.id),
            status: FiscalStatus::Created,
            sandbox: true,
            warning: None,
            raw: json!({"id": format!("DOC-{}", invoice.id)}),
        })
    }

    async fn validate_document(&self, external_id: &str) -> Result<ValidatedDocument> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        self.check()?;

        let status = *self.validation.lock().unwrap();
        Ok(ValidatedDocument {
            status,
            cufe: (status == FiscalStatus::Validated).then(|| format!("CUFE-{}", external_id)),
            raw: json!({"status": status.as_str()}),
        })
    }

    async fn send_document(&self, _external_id: &str) -> Result<SentDocument> {
        self.check()?;

        let status = *self.send_status.lock().unwrap();
        Ok(SentDocument {
            status,
            raw: json!({"status": status.as_str()}),
        })
    }

    async fn fetch_document(&self, external_id: &str, with_files: bool) -> Result<FetchedDocument> {
        self.check()?;

        let status = *self.verdict.lock().unwrap();
        Ok(FetchedDocument {
            status,
            rejected_reason: (status == FiscalStatus::Rejected)
                .then(|| "Invalid customer tax id".to_string()),
            pdf: with_files.then(|| format!("%PDF {}", external_id).into_bytes()),
            xml: with_files.then(|| format!("<Invoice id=\"{}\"/>", external_id).into_bytes()),
            raw: json!({"status": status.as_str()}),
        })
    }

    async fn cancel_document(&self, _external_id: &str, reason: &str) -> Result<CancelledDocument> {
        self.check()?;

        Ok(CancelledDocument {
            status: FiscalStatus::Cancelled,
            raw: json!({"status": "cancelled", "reason": reason}),
        })
    }
}
