use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{info, warn};

use crate::core::error::AppError;
use crate::modules::gateways::services::{GatewayService, WebhookHeaders};
use crate::modules::payments::services::ReconciliationService;

/// Receive a payment gateway callback
///
/// POST /webhooks/{gateway}
///
/// The body is read raw: signatures are computed over the exact bytes the
/// gateway sent, so nothing is decoded before the adapter verifies it.
///
/// # Returns
/// * `200 OK` - `{status: applied|duplicate|recorded|ignored, ...}`
/// * `400 Bad Request` - signature failure (generic body) or malformed event
/// * `404 Not Found` - unknown gateway or invoice
/// * `503 Service Unavailable` - store unavailable, gateway should retry
pub async fn receive_webhook(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    gateways: web::Data<Arc<GatewayService>>,
    reconciliation: web::Data<Arc<ReconciliationService>>,
) -> Result<HttpResponse, AppError> {
    let gateway = path.into_inner();

    info!(gateway = %gateway, bytes = body.len(), "Received webhook request");

    let headers: WebhookHeaders = req
        .headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect();

    let event = match gateways.verify_webhook(&gateway, &body, &headers) {
        Ok(event) => event,
        Err(e) => {
            warn!(gateway = %gateway, error = %e, "Webhook rejected");
            return Err(e);
        }
    };

    let outcome = reconciliation.apply(event).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Configure webhook routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/webhooks/{gateway}").route(web::post().to(receive_webhook)));
}
