pub mod payment_controller;
pub mod webhook_controller;

use actix_web::web;

/// Configure payment and webhook routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    payment_controller::configure(cfg);
    webhook_controller::configure(cfg);
}
