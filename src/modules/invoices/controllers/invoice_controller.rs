use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::core::error::AppError;
use crate::modules::invoices::models::CreateInvoiceRequest;
use crate::modules::invoices::services::invoice_service::InvoiceService;

/// Query parameters for listing invoices
#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Create a new invoice
/// POST /invoices
/// 201 even when the fiscal document could not be registered yet
pub async fn create_invoice(
    service: web::Data<Arc<InvoiceService>>,
    request: web::Json<CreateInvoiceRequest>,
) -> Result<HttpResponse, AppError> {
    let invoice = service.create_invoice(request.into_inner()).await?;

    Ok(HttpResponse::Created().json(invoice))
}

/// Get invoice by ID
/// GET /invoices/{id}
pub async fn get_invoice(
    service: web::Data<Arc<InvoiceService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let invoice = service.get_invoice(&path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(invoice))
}

/// List invoices
/// GET /invoices
pub async fn list_invoices(
    service: web::Data<Arc<InvoiceService>>,
    query: web::Query<ListInvoicesQuery>,
) -> Result<HttpResponse, AppError> {
    let invoices = service.list_invoices(query.limit, query.offset).await?;

    Ok(HttpResponse::Ok().json(invoices))
}

/// Soft remove an invoice
/// DELETE /invoices/{id}
pub async fn remove_invoice(
    service: web::Data<Arc<InvoiceService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    service.remove_invoice(&path.into_inner()).await?;

    Ok(HttpResponse::NoContent().finish())
}

/// Configure invoice routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/invoices")
            .route(web::post().to(create_invoice))
            .route(web::get().to(list_invoices)),
    )
    .service(
        web::resource("/invoices/{id}")
            .route(web::get().to(get_invoice))
            .route(web::delete().to(remove_invoice)),
    );
}
