use async_trait::async_trait;
use serde_json::Value;

use crate::core::Result;
use crate::modules::fiscal::models::FiscalStatus;
use crate::modules::invoices::models::Invoice;

/// Translator between an invoice and the tax authority's protocol
///
/// Implementations are stateless with respect to invoices and must fail with
/// `Configuration` (missing credentials) or `TransientGateway` (timeout, 5xx)
/// instead of hanging.
#[async_trait]
pub trait FiscalGateway: Send + Sync {
    /// True when responses are simulated
    fn is_sandbox(&self) -> bool;

    async fn create_document(&self, invoice: &Invoice) -> Result<CreatedDocument>;

    async fn validate_document(&self, external_id: &str) -> Result<ValidatedDocument>;

    async fn send_document(&self, external_id: &str) -> Result<SentDocument>;

    /// Current remote status; `with_files` also downloads the PDF and XML
    async fn fetch_document(&self, external_id: &str, with_files: bool) -> Result<FetchedDocument>;

    async fn cancel_document(&self, external_id: &str, reason: &str) -> Result<CancelledDocument>;
}

#[derive(Debug, Clone)]
pub struct CreatedDocument {
    pub external_id: String,
    pub status: FiscalStatus,
    pub sandbox: bool,
    pub warning: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct ValidatedDocument {
    pub status: FiscalStatus,
    pub cufe: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct SentDocument {
    pub status: FiscalStatus,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub status: FiscalStatus,
    pub rejected_reason: Option<String>,
    pub pdf: Option<Vec<u8>>,
    pub xml: Option<Vec<u8>>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct CancelledDocument {
    pub status: FiscalStatus,
    pub raw: Value,
}
