//! Axum router configuration for billing endpoints.

use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;

use crate::adapters::http::middleware::{auth_middleware, AuthState};

use super::handlers::{
    create_checkout, health, mobile_money_webhook, reconcile, stripe_webhook, BillingAppState,
};

/// Headroom past the sweep deadline for writes already in flight and the
/// response itself.
const RECONCILE_GRACE: Duration = Duration::from_secs(10);

/// Routes for signed-in customers. Bearer tokens are validated here only;
/// webhooks and the admin endpoint carry their own credentials.
///
/// - `POST /checkout` - open a processor checkout
pub fn customer_routes(validator: AuthState) -> Router<BillingAppState> {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route_layer(middleware::from_fn_with_state(validator, auth_middleware))
}

/// Processor callbacks, authenticated by signature.
///
/// - `POST /stripe`
/// - `POST /mobile-money`
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/stripe", post(stripe_webhook))
        .route("/mobile-money", post(mobile_money_webhook))
}

/// Operator endpoints. The sweep bounds itself, so the timeout here follows
/// the sweep deadline rather than the general request timeout.
///
/// - `POST /reconcile`
pub fn admin_routes(sweep_deadline: Duration) -> Router<BillingAppState> {
    Router::new()
        .route("/reconcile", post(reconcile))
        .layer(TimeoutLayer::new(sweep_deadline + RECONCILE_GRACE))
}

/// The complete billing router:
///
/// ```text
/// POST /api/billing/checkout               bearer (user)
/// POST /api/billing/webhooks/stripe        Stripe-Signature
/// POST /api/billing/webhooks/mobile-money  X-Signature
/// POST /api/billing/reconcile              bearer (admin token)
/// GET  /health
/// ```
///
/// Checkout and webhooks time out after `request_timeout`; reconcile after
/// the sweep deadline plus a grace period.
pub fn billing_router(
    state: BillingAppState,
    validator: AuthState,
    request_timeout: Duration,
) -> Router {
    let sweep_deadline = state.reconcile.settings().deadline;

    let api = Router::new()
        .merge(customer_routes(validator))
        .nest("/webhooks", webhook_routes())
        .layer(TimeoutLayer::new(request_timeout))
        .merge(admin_routes(sweep_deadline));

    Router::new()
        .nest("/api/billing", api)
        .route("/health", get(health))
        .with_state(state)
}
