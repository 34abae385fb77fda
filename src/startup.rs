// Wiring shared by the binary and the HTTP tests.

use std::sync::Arc;

use actix_web::web;
use sqlx::MySqlPool;
use tracing::info;

use crate::config::Config;
use crate::core::Result;
use crate::middleware::{json_error_handler, path_error_handler, query_error_handler};
use crate::modules::fiscal::services::{FiscalGateway, FiscalGatewayClient, FiscalService};
use crate::modules::gateways::services::{
    CheckoutClient, EpaycoClient, GatewayService, PaymentGateway,
};
use crate::modules::invoices::repositories::{InvoiceRepository, MySqlInvoiceRepository};
use crate::modules::invoices::services::InvoiceService;
use crate::modules::payments::repositories::{
    MySqlPaymentModeRepository, MySqlPaymentRepository, PaymentModeRepository, PaymentRepository,
};
use crate::modules::payments::services::ReconciliationService;
use crate::modules::{fiscal, gateways, health, invoices, payments};
use crate::storage::InMemoryStore;

/// The three record stores the core reads and writes
#[derive(Clone)]
pub struct Stores {
    pub invoices: Arc<dyn InvoiceRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub payment_modes: Arc<dyn PaymentModeRepository>,
}

impl Stores {
    pub fn mysql(pool: MySqlPool) -> Self {
        Self {
            invoices: Arc::new(MySqlInvoiceRepository::new(pool.clone())),
            payments: Arc::new(MySqlPaymentRepository::new(pool.clone())),
            payment_modes: Arc::new(MySqlPaymentModeRepository::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            invoices: store.clone(),
            payments: store.clone(),
            payment_modes: store,
        }
    }
}

/// Services shared by every worker
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub fiscal: Arc<FiscalService>,
    pub invoices: Arc<InvoiceService>,
    pub gateways: Arc<GatewayService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl AppState {
    pub fn new(
        stores: Stores,
        fiscal_gateway: Arc<dyn FiscalGateway>,
        payment_gateways: Vec<Arc<dyn PaymentGateway>>,
    ) -> Self {
        let fiscal = Arc::new(FiscalService::new(fiscal_gateway, stores.invoices.clone()));

        let invoices = Arc::new(InvoiceService::new(
            stores.invoices.clone(),
            stores.payments.clone(),
            fiscal.clone(),
        ));

        let mut gateway_service = GatewayService::new(stores.invoices.clone());
        for gateway in payment_gateways {
            gateway_service.register_gateway(gateway);
        }

        let reconciliation = Arc::new(ReconciliationService::new(
            stores.invoices.clone(),
            stores.payments.clone(),
            stores.payment_modes.clone(),
        ));

        Self {
            stores,
            fiscal,
            invoices,
            gateways: Arc::new(gateway_service),
            reconciliation,
        }
    }
}

/// Build the fiscal client and every payment gateway that has configuration
pub fn build_adapters(
    config: &Config,
) -> Result<(Arc<dyn FiscalGateway>, Vec<Arc<dyn PaymentGateway>>)> {
    let fiscal: Arc<dyn FiscalGateway> = Arc::new(FiscalGatewayClient::new(config.fiscal.clone())?);

    let mut gateways: Vec<Arc<dyn PaymentGateway>> = Vec::new();

    if let Some(checkout) = &config.checkout {
        gateways.push(Arc::new(CheckoutClient::new(checkout.clone())?));
    }

    if let Some(epayco) = &config.epayco {
        gateways.push(Arc::new(EpaycoClient::new(epayco.clone())?));
    }

    info!(
        fiscal_sandbox = fiscal.is_sandbox(),
        gateways = gateways.len(),
        "Adapters built"
    );

    Ok((fiscal, gateways))
}

/// Register shared state, extractor error handlers and all routes
pub fn configure_app(cfg: &mut web::ServiceConfig, state: &AppState) {
    cfg.app_data(web::Data::new(state.stores.invoices.clone()))
        .app_data(web::Data::new(state.fiscal.clone()))
        .app_data(web::Data::new(state.invoices.clone()))
        .app_data(web::Data::new(state.gateways.clone()))
        .app_data(web::Data::new(state.reconciliation.clone()))
        .app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .app_data(web::PathConfig::default().error_handler(path_error_handler))
        .configure(health::configure)
        .configure(invoices::controllers::configure)
        .configure(fiscal::configure)
        .configure(gateways::configure)
        .configure(payments::configure);
}
