//! HTTP API tests: the billing router driven with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;

use subscription_billing::adapters::auth::MockSessionValidator;
use subscription_billing::adapters::http::{billing_router, BillingAppState};
use subscription_billing::adapters::memory::InMemoryPaymentRepository;
use subscription_billing::adapters::mobile_money::{MobileMoneyAdapter, MobileMoneyConfig};
use subscription_billing::adapters::mock::MockPaymentProcessor;
use subscription_billing::adapters::stripe::{StripeConfig, StripePaymentAdapter};
use subscription_billing::application::billing::{ProcessorRegistry, SweepSettings};
use subscription_billing::domain::billing::{
    signature, Money, PaymentMethod, PaymentStatus, ProcessorError,
};
use subscription_billing::domain::foundation::{PaymentId, Timestamp};
use subscription_billing::ports::PaymentRepository;

const USER_TOKEN: &str = "user-token";
const ADMIN_TOKEN: &str = "admin-token-0123456789abcdef0123";
const STRIPE_SECRET: &str = "whsec_test_secret";
const MOBILE_SECRET: &str = "mm_secret";

// =============================================================================
// Test Infrastructure
// =============================================================================

struct TestApp {
    router: Router,
    repo: InMemoryPaymentRepository,
    stripe: MockPaymentProcessor,
}

fn app() -> TestApp {
    app_with(SweepSettings::default(), Duration::from_secs(30))
}

fn app_with(sweep: SweepSettings, request_timeout: Duration) -> TestApp {
    let repo = InMemoryPaymentRepository::new();
    let stripe = MockPaymentProcessor::new(PaymentMethod::Stripe);
    let mobile = MockPaymentProcessor::new(PaymentMethod::MobileMoney);
    let processors = ProcessorRegistry::new()
        .with(Arc::new(stripe.clone()))
        .with(Arc::new(mobile));

    let stripe_decoder = StripePaymentAdapter::new(
        StripeConfig::new(SecretString::new("sk_test_x".to_string()))
            .with_webhook_secret(Some(SecretString::new(STRIPE_SECRET.to_string()))),
    )
    .unwrap();
    let mobile_decoder = MobileMoneyAdapter::new(
        MobileMoneyConfig::new(
            SecretString::new("pk".to_string()),
            SecretString::new("sk".to_string()),
            "https://pay.example.com",
        )
        .with_webhook_secret(Some(SecretString::new(MOBILE_SECRET.to_string()))),
    )
    .unwrap();

    let state = BillingAppState::builder(
        Arc::new(repo.clone()),
        processors,
        SecretString::new(ADMIN_TOKEN.to_string()),
    )
    .decoder(Arc::new(stripe_decoder))
    .decoder(Arc::new(mobile_decoder))
    .sweep_settings(sweep)
    .build();

    let validator = MockSessionValidator::new().with_test_user(USER_TOKEN, "user-http-1");

    TestApp {
        router: billing_router(state, Arc::new(validator), request_timeout),
        repo,
        stripe,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn checkout_request(token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/billing/checkout")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn checkout_body() -> Value {
    json!({
        "planId": "unlimited",
        "amount": 999,
        "currency": "BDT",
        "customerEmail": "buyer@example.com",
        "customerName": "Buyer",
        "returnUrl": "https://app.example.com/billing/done"
    })
}

fn stripe_event(event_type: &str, session_id: &str) -> Vec<u8> {
    json!({
        "id": "evt_http_1",
        "type": event_type,
        "livemode": false,
        "data": {"object": {
            "id": session_id,
            "status": "complete",
            "payment_status": "paid",
            "amount_total": 99900,
            "currency": "bdt"
        }}
    })
    .to_string()
    .into_bytes()
}

fn webhook_request(path: &str, header_name: &str, signature: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header_name, signature)
        .body(Body::from(body))
        .unwrap()
}

fn reconcile_request(token: Option<&str>, query: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/api/billing/reconcile{}", query));
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn checkout_requires_bearer_token() {
    let app = app();

    let (status, body) = send(&app.router, checkout_request(None, checkout_body())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
    assert!(app.repo.payments().await.is_empty());
}

#[tokio::test]
async fn checkout_rejects_unknown_token() {
    let app = app();

    let (status, _) = send(&app.router, checkout_request(Some("nope"), checkout_body())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn checkout_returns_url_and_records_pending_payment() {
    let app = app();

    let (status, body) = send(&app.router, checkout_request(Some(USER_TOKEN), checkout_body())).await;

    assert_eq!(status, StatusCode::OK);
    let checkout_url = body["checkoutUrl"].as_str().unwrap();
    assert!(checkout_url.starts_with("https://checkout.test/pay/"));

    let payment_id: PaymentId = body["paymentId"].as_str().unwrap().parse().unwrap();
    let payment = app.repo.find_by_id(&payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.user_id.as_str(), "user-http-1");
    assert_eq!(payment.payment_method, PaymentMethod::Stripe);
    assert_eq!(payment.amount, Money::new(99_900, "BDT").unwrap());
}

#[tokio::test]
async fn checkout_validation_errors_are_400() {
    let app = app();
    let mut body = checkout_body();
    body["planId"] = json!("lifetime");

    let (status, response) = send(&app.router, checkout_request(Some(USER_TOKEN), body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"]["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn checkout_malformed_json_is_400() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/billing/checkout")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", USER_TOKEN))
        .body(Body::from("{\"planId\":"))
        .unwrap();

    let (status, response) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"]["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn slow_checkout_hits_request_timeout() {
    let app = app_with(SweepSettings::default(), Duration::from_millis(100));
    app.stripe.set_latency(Duration::from_millis(400));

    let (status, _) = send(&app.router, checkout_request(Some(USER_TOKEN), checkout_body())).await;

    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn processor_failure_is_502_with_generic_message() {
    let app = app();
    app.stripe.set_method_error(
        "create_checkout",
        ProcessorError::from_status(400, "No such price: price_secret_123"),
    );

    let (status, body) = send(&app.router, checkout_request(Some(USER_TOKEN), checkout_body())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "PAYMENT_PROVIDER_ERROR");
    assert!(!body.to_string().contains("price_secret_123"));
    assert!(app.repo.payments().await.is_empty());
}

// =============================================================================
// Webhooks
// =============================================================================

#[tokio::test]
async fn stripe_webhook_verifies_payment() {
    let app = app();
    let (_, created) = send(&app.router, checkout_request(Some(USER_TOKEN), checkout_body())).await;
    let payment_id: PaymentId = created["paymentId"].as_str().unwrap().parse().unwrap();
    let session_id = app
        .repo
        .find_by_id(&payment_id)
        .await
        .unwrap()
        .unwrap()
        .transaction_id;

    let body = stripe_event("checkout.session.completed", &session_id);
    let sig = signature::sign_timestamped(STRIPE_SECRET, &body, Timestamp::now().as_unix_secs());
    let request = webhook_request("/api/billing/webhooks/stripe", "Stripe-Signature", &sig, body);

    let (status, ack) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "verified");
    let payment = app.repo.find_by_id(&payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Verified);
}

#[tokio::test]
async fn stripe_webhook_with_bad_signature_is_401() {
    let app = app();
    let body = stripe_event("checkout.session.completed", "cs_test_unknown");
    let sig = signature::sign_timestamped("whsec_wrong", &body, Timestamp::now().as_unix_secs());
    let request = webhook_request("/api/billing/webhooks/stripe", "Stripe-Signature", &sig, body);

    let (status, response) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"]["code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn mobile_money_webhook_malformed_body_is_400() {
    let app = app();
    let body = br#"{"event":"payment.succeeded"}"#.to_vec();
    let sig = signature::sign(MOBILE_SECRET, &body);
    let request = webhook_request("/api/billing/webhooks/mobile-money", "X-Signature", &sig, body);

    let (status, _) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_event_type_is_acknowledged() {
    let app = app();
    let body = json!({
        "event_id": "ev_refund",
        "event": "refund.issued",
        "data": {"invoice_id": "inv_1"}
    })
    .to_string()
    .into_bytes();
    let sig = signature::sign(MOBILE_SECRET, &body);
    let request = webhook_request("/api/billing/webhooks/mobile-money", "X-Signature", &sig, body);

    let (status, ack) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "ignored");
}

#[tokio::test]
async fn unmatched_success_webhook_is_acknowledged() {
    let app = app();
    let body = stripe_event("checkout.session.completed", "cs_test_nobody_knows");
    let sig = signature::sign_timestamped(STRIPE_SECRET, &body, Timestamp::now().as_unix_secs());
    let request = webhook_request("/api/billing/webhooks/stripe", "Stripe-Signature", &sig, body);

    let (status, ack) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "unresolved");
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn reconcile_requires_admin_token() {
    let app = app();

    let (missing, _) = send(&app.router, reconcile_request(None, "")).await;
    let (user_token, _) = send(&app.router, reconcile_request(Some(USER_TOKEN), "")).await;

    assert_eq!(missing, StatusCode::UNAUTHORIZED);
    assert_eq!(user_token, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reconcile_returns_report() {
    let app = app();
    let (_, created) = send(&app.router, checkout_request(Some(USER_TOKEN), checkout_body())).await;
    let payment_id: PaymentId = created["paymentId"].as_str().unwrap().parse().unwrap();
    let session_id = app
        .repo
        .find_by_id(&payment_id)
        .await
        .unwrap()
        .unwrap()
        .transaction_id;
    app.stripe.set_status(&session_id, "paid");

    let (status, report) =
        send(&app.router, reconcile_request(Some(ADMIN_TOKEN), "?max_age_hours=24")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["checked"], 1);
    assert_eq!(report["verified"], 1);
    assert_eq!(report["errors"], json!([]));
    let payment = app.repo.find_by_id(&payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Verified);
}

#[tokio::test]
async fn reconcile_rejects_out_of_range_window() {
    let app = app();

    let (status, body) =
        send(&app.router, reconcile_request(Some(ADMIN_TOKEN), "?max_age_hours=0")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn sweep_longer_than_request_timeout_still_reports() {
    let app = app_with(
        SweepSettings {
            deadline: Duration::from_millis(250),
            concurrency: 1,
            batch_limit: 10,
        },
        Duration::from_millis(100),
    );
    for _ in 0..2 {
        let (_, created) =
            send(&app.router, checkout_request(Some(USER_TOKEN), checkout_body())).await;
        let payment_id: PaymentId = created["paymentId"].as_str().unwrap().parse().unwrap();
        let session_id = app
            .repo
            .find_by_id(&payment_id)
            .await
            .unwrap()
            .unwrap()
            .transaction_id;
        app.stripe.set_status(&session_id, "paid");
    }
    app.stripe.set_latency(Duration::from_millis(150));

    let (status, report) = send(&app.router, reconcile_request(Some(ADMIN_TOKEN), "")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["verified"], 1);
    assert_eq!(report["skipped"], 1);
}

#[tokio::test]
async fn report_counts_unmatched_webhooks() {
    let app = app();
    let body = stripe_event("checkout.session.completed", "cs_test_nobody_knows");
    let sig = signature::sign_timestamped(STRIPE_SECRET, &body, Timestamp::now().as_unix_secs());
    let request = webhook_request("/api/billing/webhooks/stripe", "Stripe-Signature", &sig, body);
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, report) = send(&app.router, reconcile_request(Some(ADMIN_TOKEN), "")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["unmatched_webhooks"], 1);
    assert_eq!(report["checked"], 0);
}
