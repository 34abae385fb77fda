use std::sync::Arc;

use actix_web::{http::header, web, HttpResponse};
use serde::Deserialize;

use crate::core::error::AppError;
use crate::modules::fiscal::services::{DocumentKind, FiscalService};
use crate::modules::invoices::models::InvoiceResponse;

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

/// Submit the validated document
/// POST /invoices/{id}/fiscal/send
pub async fn send_document(
    service: web::Data<Arc<FiscalService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let invoice = service.send(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(InvoiceResponse::from(invoice)))
}

/// Pull acceptance or rejection for a sent document
/// POST /invoices/{id}/fiscal/refresh
pub async fn refresh_document(
    service: web::Data<Arc<FiscalService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let invoice = service.refresh(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(InvoiceResponse::from(invoice)))
}

/// Cancel a sent document; 409 in any other status
/// POST /invoices/{id}/fiscal/cancel
pub async fn cancel_document(
    service: web::Data<Arc<FiscalService>>,
    path: web::Path<String>,
    request: web::Json<CancelRequest>,
) -> Result<HttpResponse, AppError> {
    let invoice = service
        .cancel(&path.into_inner(), &request.reason)
        .await?;
    Ok(HttpResponse::Ok().json(InvoiceResponse::from(invoice)))
}

/// Download the fiscal PDF or XML
/// GET /invoices/{id}/fiscal/{kind}
pub async fn download_document(
    service: web::Data<Arc<FiscalService>>,
    path: web::Path<(String, DocumentKind)>,
) -> Result<HttpResponse, AppError> {
    let (invoice_id, kind) = path.into_inner();
    let bytes = service.download(&invoice_id, kind).await?;

    Ok(HttpResponse::Ok()
        .content_type(kind.content_type())
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.{}\"", invoice_id, kind.extension()),
        ))
        .body(bytes))
}

/// Configure fiscal routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/invoices/{id}/fiscal/send").route(web::post().to(send_document)))
        .service(
            web::resource("/invoices/{id}/fiscal/refresh").route(web::post().to(refresh_document)),
        )
        .service(
            web::resource("/invoices/{id}/fiscal/cancel").route(web::post().to(cancel_document)),
        )
        .service(
            web::resource("/invoices/{id}/fiscal/{kind}").route(web::get().to(download_document)),
        );
}
