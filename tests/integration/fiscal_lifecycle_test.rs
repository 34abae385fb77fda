/// Fiscal document lifecycle through the orchestrator and the state machine
use std::sync::Arc;
use std::time::{Duration, Instant};

use fiscalpay::config::FiscalConfig;
use fiscalpay::core::{AppError, Currency};
use fiscalpay::fiscal::services::DocumentKind;
use fiscalpay::fiscal::{FiscalGatewayClient, FiscalService, FiscalStatus, FiscalSweeper};
use fiscalpay::invoices::{InvoiceRepository, InvoiceService};
use fiscalpay::storage::InMemoryStore;
use rust_decimal_macros::dec;

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::*;

#[tokio::test]
async fn test_create_survives_fiscal_timeout() {
    let ctx = TestContext::with_fiscal(ScriptedFiscalGateway::always_timeout());

    let response = ctx.create_invoice(Currency::COP, dec!(50000)).await;
    assert_eq!(response.invoice.total, dec!(50000));
    assert!(response.invoice.fiscal_document.is_none());
    assert_eq!(response.fiscal_badge, "not yet sent");

    let stored = ctx.store.find_by_id(&response.invoice.id).await.unwrap().unwrap();
    assert!(stored.fiscal_document.is_none());

    // Nothing to validate
    let after = ctx.state.fiscal.ensure_validated(&stored).await.unwrap();
    assert!(after.fiscal_document.is_none());
    assert_eq!(ctx.fiscal.validate_calls(), 0);
}

#[tokio::test]
async fn test_create_answers_within_budget_when_fiscal_is_slow() {
    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(ScriptedFiscalGateway::succeeding());
    gateway.set_create_delay(Duration::from_millis(600));

    let fiscal = Arc::new(FiscalService::new(gateway.clone(), store.clone()));
    let invoices = InvoiceService::new(store.clone(), store.clone(), fiscal)
        .with_fiscal_budget(Duration::from_millis(100));

    let started = Instant::now();
    let response = invoices
        .create_invoice(TestDataFactory::invoice_request(Currency::COP, dec!(50000)))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(response.invoice.fiscal_document.is_none());
    assert_eq!(response.fiscal_badge, "not yet sent");

    // The document lands once the gateway answers
    tokio::time::sleep(Duration::from_millis(900)).await;
    let stored = store.find_by_id(&response.invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.fiscal_status(), Some(FiscalStatus::Created));
    assert_eq!(gateway.create_calls(), 1);
}

#[tokio::test]
async fn test_create_survives_missing_credentials() {
    let ctx = TestContext::with_fiscal(ScriptedFiscalGateway::unconfigured());

    let response = ctx.create_invoice(Currency::USD, dec!(250.50)).await;
    assert!(response.invoice.fiscal_document.is_none());
    assert_eq!(ctx.fiscal.create_calls(), 1);
}

#[tokio::test]
async fn test_ensure_validated_is_idempotent() {
    let ctx = TestContext::new();
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;
    assert_eq!(invoice.fiscal_status(), Some(FiscalStatus::Created));

    let validated = ctx.state.fiscal.ensure_validated(&invoice).await.unwrap();
    let document = validated.fiscal_document.clone().unwrap();
    assert_eq!(document.status, FiscalStatus::Validated);
    assert!(document.validated_at.is_some());
    assert!(document.cufe.is_some());

    let again = ctx.state.fiscal.ensure_validated(&validated).await.unwrap();
    assert_eq!(again.fiscal_document.unwrap().validated_at, document.validated_at);
    assert_eq!(ctx.fiscal.validate_calls(), 1);
}

#[tokio::test]
async fn test_ensure_created_does_not_create_twice() {
    let ctx = TestContext::new();
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;

    let again = ctx.state.fiscal.ensure_created(&invoice).await.unwrap();
    assert_eq!(
        again.fiscal_document.unwrap().external_id,
        invoice.fiscal_document.unwrap().external_id
    );
    assert_eq!(ctx.fiscal.create_calls(), 1);
}

#[tokio::test]
async fn test_stale_copy_loses_the_race_quietly() {
    let ctx = TestContext::new();
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;

    ctx.state.fiscal.ensure_validated(&invoice).await.unwrap();

    // A second reader still holding the `created` copy
    let result = ctx.state.fiscal.ensure_validated(&invoice).await.unwrap();
    assert_eq!(result.fiscal_status(), Some(FiscalStatus::Validated));

    let stored = ctx.store.find_by_id(&invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.fiscal_document.unwrap().history.len(), 2);
}

#[tokio::test]
async fn test_read_advances_created_to_validated() {
    let ctx = TestContext::new();
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;

    let read = ctx.state.invoices.get_invoice(&invoice.id).await.unwrap();
    assert_eq!(read.invoice.fiscal_status(), Some(FiscalStatus::Validated));
    assert_eq!(read.fiscal_badge, "validated");
}

#[tokio::test]
async fn test_read_swallows_fiscal_errors() {
    let ctx = TestContext::new();
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;
    ctx.fiscal.set_behavior(FiscalBehavior::Timeout);

    let read = ctx.state.invoices.get_invoice(&invoice.id).await.unwrap();
    assert_eq!(read.invoice.fiscal_status(), Some(FiscalStatus::Created));

    // Retried on the next read once the gateway recovers
    ctx.fiscal.set_behavior(FiscalBehavior::Succeed);
    let read = ctx.state.invoices.get_invoice(&invoice.id).await.unwrap();
    assert_eq!(read.invoice.fiscal_status(), Some(FiscalStatus::Validated));
}

#[tokio::test]
async fn test_remote_still_processing_keeps_created() {
    let ctx = TestContext::new();
    ctx.fiscal.set_validation(FiscalStatus::Created);
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;

    let after = ctx.state.fiscal.ensure_validated(&invoice).await.unwrap();
    assert_eq!(after.fiscal_status(), Some(FiscalStatus::Created));
}

#[tokio::test]
async fn test_send_then_accept() {
    let ctx = TestContext::new();
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;
    let fiscal = &ctx.state.fiscal;
    fiscal.ensure_validated(&invoice).await.unwrap();

    let sent = fiscal.send(&invoice.id).await.unwrap();
    assert_eq!(sent.fiscal_status(), Some(FiscalStatus::Sent));
    assert!(sent.fiscal_document.as_ref().unwrap().sent_at.is_some());

    // Still pending at the tax authority
    let unchanged = fiscal.refresh(&invoice.id).await.unwrap();
    assert_eq!(unchanged.fiscal_status(), Some(FiscalStatus::Sent));

    ctx.fiscal.set_verdict(FiscalStatus::Accepted);
    let accepted = fiscal.refresh(&invoice.id).await.unwrap();
    let document = accepted.fiscal_document.unwrap();
    assert_eq!(document.status, FiscalStatus::Accepted);
    assert!(document.accepted_at.is_some());
}

#[tokio::test]
async fn test_rejection_records_reason() {
    let ctx = TestContext::new();
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;
    let fiscal = &ctx.state.fiscal;
    fiscal.ensure_validated(&invoice).await.unwrap();
    fiscal.send(&invoice.id).await.unwrap();

    ctx.fiscal.set_verdict(FiscalStatus::Rejected);
    let rejected = fiscal.refresh(&invoice.id).await.unwrap();
    let document = rejected.fiscal_document.unwrap();
    assert_eq!(document.status, FiscalStatus::Rejected);
    assert_eq!(document.rejected_reason.as_deref(), Some("Invalid customer tax id"));
}

#[tokio::test]
async fn test_send_answered_with_rejection_keeps_document_validated() {
    let ctx = TestContext::new();
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;
    let fiscal = &ctx.state.fiscal;
    fiscal.ensure_validated(&invoice).await.unwrap();

    ctx.fiscal.set_send_status(FiscalStatus::Rejected);
    let err = fiscal.send(&invoice.id).await.unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));

    let stored = ctx.store.find_by_id(&invoice.id).await.unwrap().unwrap();
    let document = stored.fiscal_document.unwrap();
    assert_eq!(document.status, FiscalStatus::Validated);
    assert!(document.sent_at.is_none());

    // A later send that the gateway accepts goes through
    ctx.fiscal.set_send_status(FiscalStatus::Sent);
    let sent = fiscal.send(&invoice.id).await.unwrap();
    assert_eq!(sent.fiscal_status(), Some(FiscalStatus::Sent));
}

#[tokio::test]
async fn test_cancel_only_from_sent() {
    let ctx = TestContext::new();
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;
    let fiscal = &ctx.state.fiscal;

    let err = fiscal.cancel(&invoice.id, "Duplicate invoice").await.unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));

    fiscal.ensure_validated(&invoice).await.unwrap();
    let err = fiscal.cancel(&invoice.id, "Duplicate invoice").await.unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));

    fiscal.send(&invoice.id).await.unwrap();
    let cancelled = fiscal.cancel(&invoice.id, "Duplicate invoice").await.unwrap();
    let document = cancelled.fiscal_document.unwrap();
    assert_eq!(document.status, FiscalStatus::Cancelled);
    assert_eq!(document.cancelled_reason.as_deref(), Some("Duplicate invoice"));
    assert!(document.cancelled_at.is_some());

    // Terminal
    let err = fiscal.cancel(&invoice.id, "Again").await.unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));
}

#[tokio::test]
async fn test_cancel_requires_reason() {
    let ctx = TestContext::new();
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;

    let err = ctx.state.fiscal.cancel(&invoice.id, "   ").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_send_without_document_is_conflict() {
    let ctx = TestContext::with_fiscal(ScriptedFiscalGateway::always_timeout());
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;

    let err = ctx.state.fiscal.send(&invoice.id).await.unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));
}

#[tokio::test]
async fn test_download_documents() {
    let ctx = TestContext::new();
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;

    let pdf = ctx.state.fiscal.download(&invoice.id, DocumentKind::Pdf).await.unwrap();
    assert!(pdf.starts_with(b"%PDF"));
    let xml = ctx.state.fiscal.download(&invoice.id, DocumentKind::Xml).await.unwrap();
    assert!(xml.starts_with(b"<Invoice"));
}

#[tokio::test]
async fn test_download_without_document_is_not_found() {
    let ctx = TestContext::with_fiscal(ScriptedFiscalGateway::always_timeout());
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;

    let err = ctx
        .state
        .fiscal
        .download(&invoice.id, DocumentKind::Pdf)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_sweeper_validates_backlog() {
    let ctx = TestContext::new();
    for _ in 0..3 {
        ctx.create_invoice(Currency::COP, dec!(1000)).await;
    }

    let sweeper = FiscalSweeper::new(
        ctx.state.fiscal.clone(),
        ctx.state.stores.invoices.clone(),
        Duration::from_secs(60),
    );

    assert_eq!(sweeper.sweep().await.unwrap(), 3);
    assert_eq!(sweeper.sweep().await.unwrap(), 0);
}

#[tokio::test]
async fn test_sweeper_stops_on_missing_credentials() {
    let ctx = TestContext::new();
    for _ in 0..3 {
        ctx.create_invoice(Currency::COP, dec!(1000)).await;
    }
    ctx.fiscal.set_behavior(FiscalBehavior::Unconfigured);

    let sweeper = FiscalSweeper::new(
        ctx.state.fiscal.clone(),
        ctx.state.stores.invoices.clone(),
        Duration::from_secs(60),
    );

    assert_eq!(sweeper.sweep().await.unwrap(), 0);
    assert_eq!(ctx.fiscal.validate_calls(), 1);
}

#[tokio::test]
async fn test_sandbox_client_runs_whole_lifecycle() {
    let client = FiscalGatewayClient::new(FiscalConfig::default()).unwrap();
    let ctx = TestContext::new();
    let fiscal = fiscalpay::fiscal::FiscalService::new(
        Arc::new(client),
        ctx.state.stores.invoices.clone(),
    );
    assert!(fiscal.is_sandbox());

    let invoice = ctx
        .store
        .create(&fiscalpay::invoices::Invoice::from_request(TestDataFactory::invoice_request(
            Currency::COP,
            dec!(50000),
        ))
        .unwrap())
        .await
        .unwrap();

    let created = fiscal.ensure_created(&invoice).await.unwrap();
    let document = created.fiscal_document.clone().unwrap();
    assert!(document.sandbox);
    assert!(document.external_id.starts_with("SANDBOX-"));
    assert!(document.warning.is_some());

    let validated = fiscal.ensure_validated(&created).await.unwrap();
    assert_eq!(validated.fiscal_status(), Some(FiscalStatus::Validated));

    fiscal.send(&invoice.id).await.unwrap();
    let accepted = fiscal.refresh(&invoice.id).await.unwrap();
    assert_eq!(accepted.fiscal_status(), Some(FiscalStatus::Accepted));
}
