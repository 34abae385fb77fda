/// HTTP surface: invoices, fiscal actions, payment sessions, health
use actix_web::{http::StatusCode, test, App};
use fiscalpay::core::Currency;
use fiscalpay::fiscal::FiscalStatus;
use fiscalpay::gateways::services::gateway_trait::parse_amount;
use fiscalpay::invoices::InvoiceRepository;
use fiscalpay::startup::configure_app;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::*;

fn decimal(value: &Value) -> Decimal {
    parse_amount(value).expect("decimal field")
}

fn payer() -> Value {
    json!({"payer": {"name": "Ana Gómez", "email": "ana@example.com", "document": "1020304050"}})
}

#[actix_web::test]
async fn test_create_invoice_returns_created_with_fiscal_badge() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.state))).await;

    let req = test::TestRequest::post()
        .uri("/invoices")
        .set_json(TestDataFactory::invoice_payload())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(decimal(&body["total"]), dec!(119000));
    assert_eq!(decimal(&body["balance"]), dec!(119000));
    assert_eq!(body["payment_status"], "unpaid");
    assert_eq!(body["fiscal_badge"], "not yet sent");
    assert_eq!(ctx.fiscal.create_calls(), 1);
}

#[actix_web::test]
async fn test_create_invoice_survives_fiscal_timeout() {
    let ctx = TestContext::with_fiscal(ScriptedFiscalGateway::always_timeout());
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.state))).await;

    let req = test::TestRequest::post()
        .uri("/invoices")
        .set_json(TestDataFactory::invoice_payload())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["fiscal_document"].is_null());
    assert_eq!(body["fiscal_badge"], "not yet sent");
}

#[actix_web::test]
async fn test_create_invoice_rejects_malformed_json() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.state))).await;

    let req = test::TestRequest::post()
        .uri("/invoices")
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"client_id\": ")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"]["message"].is_string());
}

#[actix_web::test]
async fn test_create_invoice_rejects_empty_items() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.state))).await;

    let req = test::TestRequest::post()
        .uri("/invoices")
        .set_json(json!({"client_id": "c-1", "currency": "COP", "items": []}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_get_invoice_validates_lazily() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.state))).await;
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;
    assert_eq!(invoice.fiscal_status(), Some(FiscalStatus::Created));

    let req = test::TestRequest::get()
        .uri(&format!("/invoices/{}", invoice.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["fiscal_document"]["status"], "validated");
    assert_eq!(body["fiscal_badge"], "validated");
    assert_eq!(ctx.fiscal.validate_calls(), 1);
}

#[actix_web::test]
async fn test_list_and_remove_invoices() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.state))).await;
    let first = ctx.create_invoice(Currency::COP, dec!(1000)).await.invoice;
    ctx.create_invoice(Currency::USD, dec!(20)).await;

    let req = test::TestRequest::get().uri("/invoices?limit=10").to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let req = test::TestRequest::delete()
        .uri(&format!("/invoices/{}", first.id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/invoices/{}", first.id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::delete()
        .uri(&format!("/invoices/{}", first.id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get().uri("/invoices").to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn test_list_rejects_out_of_range_limit() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.state))).await;

    let req = test::TestRequest::get().uri("/invoices?limit=0").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get().uri("/invoices?limit=abc").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_invoice_payments_listing() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.state))).await;
    let invoice = ctx.create_invoice(Currency::COP, dec!(100000)).await.invoice;

    for (amount, txn) in [(30000, "T1"), (20000, "T2")] {
        let (body, signature) = sign_checkout(&checkout_event(&invoice.id, "completed", amount, txn));
        let req = test::TestRequest::post()
            .uri("/webhooks/checkout")
            .insert_header(("content-type", "application/json"))
            .insert_header(("X-Signature", signature))
            .set_payload(body)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    let req = test::TestRequest::get()
        .uri(&format!("/invoices/{}/payments", invoice.id))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let payments = body.as_array().unwrap();
    assert_eq!(payments.len(), 2);
    assert_eq!(payments[0]["gateway"], "checkout");

    let total: Decimal = payments.iter().map(|p| decimal(&p["amount"])).sum();
    assert_eq!(total, dec!(50000));

    let req = test::TestRequest::get()
        .uri(&format!("/invoices/{}", invoice.id))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["payment_status"], "partially");
    assert_eq!(decimal(&body["balance"]), dec!(50000));
}

#[actix_web::test]
async fn test_fiscal_send_refresh_and_download() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.state))).await;
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;
    ctx.fiscal.set_verdict(FiscalStatus::Accepted);

    // Reading the invoice validates its document
    let req = test::TestRequest::get()
        .uri(&format!("/invoices/{}", invoice.id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri(&format!("/invoices/{}/fiscal/send", invoice.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["fiscal_document"]["status"], "sent");
    assert_eq!(body["fiscal_badge"], "sent");

    let req = test::TestRequest::post()
        .uri(&format!("/invoices/{}/fiscal/refresh", invoice.id))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["fiscal_document"]["status"], "accepted");

    let req = test::TestRequest::get()
        .uri(&format!("/invoices/{}/fiscal/pdf", invoice.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-type").unwrap(), "application/pdf");
    let bytes = test::read_body(resp).await;
    assert!(bytes.starts_with(b"%PDF"));

    let req = test::TestRequest::get()
        .uri(&format!("/invoices/{}/fiscal/xml", invoice.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-type").unwrap(), "application/xml");

    let req = test::TestRequest::get()
        .uri(&format!("/invoices/{}/fiscal/docx", invoice.id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_fiscal_cancel_requires_sent_document() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.state))).await;
    let invoice = ctx.create_invoice(Currency::COP, dec!(50000)).await.invoice;

    let cancel = |id: &str| {
        test::TestRequest::post()
            .uri(&format!("/invoices/{}/fiscal/cancel", id))
            .set_json(json!({"reason": "Duplicated invoice"}))
            .to_request()
    };

    let resp = test::call_service(&app, cancel(&invoice.id)).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::get()
        .uri(&format!("/invoices/{}", invoice.id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri(&format!("/invoices/{}/fiscal/send", invoice.id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let resp = test::call_service(&app, cancel(&invoice.id)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["fiscal_document"]["status"], "cancelled");
    assert_eq!(body["fiscal_badge"], "cancelled");

    let stored = ctx.store.find_by_id(&invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.fiscal_status(), Some(FiscalStatus::Cancelled));
}

#[actix_web::test]
async fn test_open_epayco_session_and_checkout_form() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.state))).await;
    let invoice = ctx.create_invoice(Currency::COP, dec!(75000)).await.invoice;
    let uri = format!("/invoices/{}/payment-sessions/epayco", invoice.id);

    let resp = test::call_service(&app, test::TestRequest::post().uri(&uri).set_json(payer()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let session: Value = test::read_body_json(resp).await;
    assert_eq!(session["status"], "pending");
    assert_eq!(session["sandbox"], true);

    // A second open resumes the active session
    let resp = test::call_service(&app, test::TestRequest::post().uri(&uri).set_json(payer()).to_request()).await;
    let again: Value = test::read_body_json(resp).await;
    assert_eq!(again["reference"], session["reference"]);

    let req = test::TestRequest::get()
        .uri(&format!("{}/checkout", uri))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("https://checkout.epayco.example/payment"));
    assert!(html.contains(&invoice.id));
    assert!(html.contains("p_signature"));
}

#[actix_web::test]
async fn test_session_rules() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.state))).await;

    let eur = ctx.create_invoice(Currency::EUR, dec!(90)).await.invoice;
    let req = test::TestRequest::post()
        .uri(&format!("/invoices/{}/payment-sessions/epayco", eur.id))
        .set_json(payer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&format!("/invoices/{}/payment-sessions/unknown", eur.id))
        .set_json(payer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri(&format!("/invoices/{}/payment-sessions/epayco/checkout", eur.id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let cop = ctx.create_invoice(Currency::COP, dec!(1000)).await.invoice;
    let (body, signature) = sign_checkout(&checkout_event(&cop.id, "completed", 1000, "T1"));
    let req = test::TestRequest::post()
        .uri("/webhooks/checkout")
        .insert_header(("content-type", "application/json"))
        .insert_header(("X-Signature", signature))
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri(&format!("/invoices/{}/payment-sessions/epayco", cop.id))
        .set_json(payer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

    let invalid_payer = json!({"payer": {"name": "", "email": "nobody"}});
    let usd = ctx.create_invoice(Currency::USD, dec!(10)).await.invoice;
    let req = test::TestRequest::post()
        .uri(&format!("/invoices/{}/payment-sessions/epayco", usd.id))
        .set_json(invalid_payer)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_list_gateways() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.state))).await;

    let req = test::TestRequest::get().uri("/gateways").to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["checkout", "epayco"]);
    assert_eq!(body[1]["supported_currencies"], json!(["COP", "USD"]));
}

#[actix_web::test]
async fn test_health_and_readiness() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &ctx.state))).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["service"], "fiscalpay");
    assert_eq!(body["status"], "healthy");

    let req = test::TestRequest::get().uri("/ready").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    ctx.store.set_available(false);
    let req = test::TestRequest::get().uri("/ready").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::SERVICE_UNAVAILABLE);
}
