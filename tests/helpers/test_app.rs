// Application context over the in-memory store

use std::sync::Arc;

use fiscalpay::core::Currency;
use fiscalpay::gateways::{CheckoutClient, EpaycoClient, PaymentGateway};
use fiscalpay::invoices::InvoiceResponse;
use fiscalpay::startup::{AppState, Stores};
use fiscalpay::storage::InMemoryStore;
use rust_decimal::Decimal;

use super::fiscal_double::ScriptedFiscalGateway;
use super::test_data::TestDataFactory;
use super::webhooks::{checkout_config, epayco_config};

/// Gateway APIs are never reached in these tests; the port is closed
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:9";

pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub fiscal: Arc<ScriptedFiscalGateway>,
    pub state: AppState,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_fiscal(ScriptedFiscalGateway::succeeding())
    }

    pub fn with_fiscal(fiscal: ScriptedFiscalGateway) -> Self {
        let gateways: Vec<Arc<dyn PaymentGateway>> = vec![
            Arc::new(CheckoutClient::new(checkout_config(UNREACHABLE_URL)).unwrap()),
            Arc::new(EpaycoClient::new(epayco_config(UNREACHABLE_URL)).unwrap()),
        ];
        Self::with_gateways(fiscal, gateways)
    }

    pub fn with_gateways(fiscal: ScriptedFiscalGateway, gateways: Vec<Arc<dyn PaymentGateway>>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let fiscal = Arc::new(fiscal);
        let state = AppState::new(Stores::in_memory(store.clone()), fiscal.clone(), gateways);

        Self {
            store,
            fiscal,
            state,
        }
    }

    /// Create an invoice through the orchestrator
    pub async fn create_invoice(&self, currency: Currency, total: Decimal) -> InvoiceResponse {
        self.state
            .invoices
            .create_invoice(TestDataFactory::invoice_request(currency, total))
            .await
            .unwrap()
    }
}
