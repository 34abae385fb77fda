use std::sync::Arc;

use actix_web::{web, HttpResponse};

use crate::core::error::AppError;
use crate::modules::invoices::services::InvoiceService;

/// Payment ledger of an invoice
/// GET /invoices/{id}/payments
pub async fn list_invoice_payments(
    service: web::Data<Arc<InvoiceService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let payments = service.payments(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(payments))
}

/// Configure payment routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/invoices/{id}/payments").route(web::get().to(list_invoice_payments)),
    );
}
