use std::sync::Arc;

use actix_web::{http::header, web, HttpResponse};
use serde::Deserialize;

use crate::core::error::AppError;
use crate::modules::gateways::models::RedirectMethod;
use crate::modules::gateways::services::{GatewayService, Payer};

#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub payer: Payer,
}

/// List all available payment gateways
/// GET /gateways
/// Returns list of gateways with their supported currencies
pub async fn list_gateways(
    service: web::Data<Arc<GatewayService>>,
) -> Result<HttpResponse, AppError> {
    let gateways = service.list_gateways();
    Ok(HttpResponse::Ok().json(gateways))
}

/// Open (or resume) a payment session
/// POST /invoices/{id}/payment-sessions/{gateway}
pub async fn open_session(
    service: web::Data<Arc<GatewayService>>,
    path: web::Path<(String, String)>,
    request: web::Json<OpenSessionRequest>,
) -> Result<HttpResponse, AppError> {
    let (invoice_id, gateway) = path.into_inner();
    let session = service
        .open_session(&invoice_id, &gateway, &request.payer)
        .await?;

    Ok(HttpResponse::Ok().json(session))
}

/// Send the payer's browser to the gateway
/// GET /invoices/{id}/payment-sessions/{gateway}/checkout
pub async fn checkout(
    service: web::Data<Arc<GatewayService>>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (invoice_id, gateway) = path.into_inner();
    let redirect = service.checkout(&invoice_id, &gateway).await?;

    let response = match redirect.method {
        RedirectMethod::Get if redirect.fields.is_empty() => HttpResponse::Found()
            .insert_header((header::LOCATION, redirect.url))
            .finish(),
        _ => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(redirect.render_form()),
    };

    Ok(response)
}

/// Read-only status of the latest session
/// GET /invoices/{id}/payment-sessions/{gateway}/status
pub async fn session_status(
    service: web::Data<Arc<GatewayService>>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (invoice_id, gateway) = path.into_inner();
    let status = service.session_status(&invoice_id, &gateway).await?;
    Ok(HttpResponse::Ok().json(status))
}

/// Configure gateway routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/gateways").route(web::get().to(list_gateways)))
        .service(
            web::resource("/invoices/{id}/payment-sessions/{gateway}")
                .route(web::post().to(open_session)),
        )
        .service(
            web::resource("/invoices/{id}/payment-sessions/{gateway}/checkout")
                .route(web::get().to(checkout)),
        )
        .service(
            web::resource("/invoices/{id}/payment-sessions/{gateway}/status")
                .route(web::get().to(session_status)),
        );
}
