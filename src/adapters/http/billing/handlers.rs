//! HTTP handlers for billing endpoints.
//!
//! These handlers connect axum routes to the billing application handlers.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::adapters::http::middleware::{bearer_token, RequireAuth};
use crate::application::handlers::billing::{
    ApplyOutcomeHandler, CreateCheckoutCommand, CreateCheckoutHandler, HandleWebhookCommand,
    HandleWebhookHandler, PaymentResolver, ProcessorRegistry, ReconcilePendingCommand,
    ReconcilePendingHandler, SweepSettings,
};
use crate::domain::billing::{BillingError, PaymentMethod, WebhookError};
use crate::domain::foundation::{AnalysisId, ValidationError};
use crate::ports::{PaymentRepository, ProcessedEventStore, WebhookDecoder};

use super::dto::{
    CheckoutResponse, CreateCheckoutRequest, ErrorResponse, HealthResponse, ReconcileQuery,
    WebhookAck,
};

/// Longest window an operator may ask the sweep to look back over.
const MAX_RECONCILE_AGE_HOURS: u64 = 24 * 30;

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the billing routes. Cloned per request.
#[derive(Clone)]
pub struct BillingAppState {
    pub checkout: Arc<CreateCheckoutHandler>,
    pub webhooks: Arc<HandleWebhookHandler>,
    pub reconcile: Arc<ReconcilePendingHandler>,
    /// Shared secret guarding `POST /reconcile`.
    pub admin_token: SecretString,
    /// Look-back used when the caller gives no `max_age_hours`.
    pub default_max_age: Duration,
}

impl BillingAppState {
    /// Starts wiring the handlers around one repository and processor set.
    pub fn builder(
        repository: Arc<dyn PaymentRepository>,
        processors: ProcessorRegistry,
        admin_token: SecretString,
    ) -> BillingAppStateBuilder {
        BillingAppStateBuilder {
            repository,
            processors,
            admin_token,
            decoders: Vec::new(),
            event_store: None,
            sweep: SweepSettings::default(),
            default_max_age: Duration::from_secs(72 * 3600),
        }
    }
}

/// Builds the handler graph shared by the routes.
///
/// The checkout, webhook and sweep paths all write through the same
/// `ApplyOutcomeHandler`, so a webhook and a sweep racing on one payment
/// settle it exactly once.
pub struct BillingAppStateBuilder {
    repository: Arc<dyn PaymentRepository>,
    processors: ProcessorRegistry,
    admin_token: SecretString,
    decoders: Vec<Arc<dyn WebhookDecoder>>,
    event_store: Option<Arc<dyn ProcessedEventStore>>,
    sweep: SweepSettings,
    default_max_age: Duration,
}

impl BillingAppStateBuilder {
    pub fn decoder(mut self, decoder: Arc<dyn WebhookDecoder>) -> Self {
        self.decoders.push(decoder);
        self
    }

    pub fn event_store(mut self, store: Arc<dyn ProcessedEventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    pub fn sweep_settings(mut self, settings: SweepSettings) -> Self {
        self.sweep = settings;
        self
    }

    pub fn default_max_age(mut self, max_age: Duration) -> Self {
        self.default_max_age = max_age;
        self
    }

    pub fn build(self) -> BillingAppState {
        let writer = Arc::new(ApplyOutcomeHandler::new(self.repository.clone()));
        let resolver = Arc::new(PaymentResolver::new(self.repository.clone()));

        let mut webhooks = HandleWebhookHandler::new(resolver.clone(), writer.clone());
        for decoder in self.decoders {
            webhooks = webhooks.with_decoder(decoder);
        }
        if let Some(store) = self.event_store {
            webhooks = webhooks.with_event_store(store);
        }

        BillingAppState {
            checkout: Arc::new(CreateCheckoutHandler::new(
                self.repository.clone(),
                self.processors.clone(),
            )),
            webhooks: Arc::new(webhooks),
            reconcile: Arc::new(
                ReconcilePendingHandler::new(self.repository, self.processors, writer, self.sweep)
                    .with_resolver(resolver),
            ),
            admin_token: self.admin_token,
            default_max_age: self.default_max_age,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/checkout
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
    payload: Result<Json<CreateCheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, BillingApiError> {
    let Json(req) = payload.map_err(|rejection| {
        BillingApiError::from(ValidationError::invalid_format("body", rejection.body_text()))
    })?;

    let analysis_id = req
        .analysis_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            AnalysisId::from_str(s.trim())
                .map_err(|_| ValidationError::invalid_format("analysisId", "must be a UUID"))
        })
        .transpose()?;

    let amount_minor = req.amount_minor()?;

    let cmd = CreateCheckoutCommand {
        user,
        plan_id: req.plan_id,
        amount_minor,
        currency: req.currency,
        customer_email: req.customer_email,
        customer_name: req.customer_name,
        analysis_id,
        return_url: req.return_url,
        payment_method: req.payment_method,
    };

    let created = state.checkout.handle(cmd).await?;
    Ok(Json(created.into()))
}

/// POST /api/billing/webhooks/stripe
pub async fn stripe_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookApiError> {
    receive_webhook(&state, PaymentMethod::Stripe, &headers, body).await
}

/// POST /api/billing/webhooks/mobile-money
pub async fn mobile_money_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookApiError> {
    receive_webhook(&state, PaymentMethod::MobileMoney, &headers, body).await
}

async fn receive_webhook(
    state: &BillingAppState,
    method: PaymentMethod,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookApiError> {
    let signature = state
        .webhooks
        .signature_header(method)
        .and_then(|name| headers.get(name))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = HandleWebhookCommand {
        method,
        raw_body: body.to_vec(),
        signature,
    };

    let outcome = state.webhooks.handle(cmd).await?;
    Ok(Json(WebhookAck::from(&outcome)))
}

/// POST /api/billing/reconcile?max_age_hours=N
pub async fn reconcile(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    query: Result<Query<ReconcileQuery>, QueryRejection>,
) -> Result<Response, BillingApiError> {
    if !is_admin(&headers, &state.admin_token) {
        tracing::warn!("reconcile request with missing or wrong admin token");
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("UNAUTHENTICATED", "Admin token required")),
        )
            .into_response());
    }

    let Query(query) = query.map_err(|rejection| {
        BillingApiError::from(ValidationError::invalid_format("query", rejection.body_text()))
    })?;
    let max_age = match query.max_age_hours {
        None => state.default_max_age,
        Some(hours) if (1..=MAX_RECONCILE_AGE_HOURS).contains(&hours) => {
            Duration::from_secs(hours * 3600)
        }
        Some(hours) => {
            return Err(ValidationError::out_of_range(
                "max_age_hours",
                1,
                MAX_RECONCILE_AGE_HOURS as i64,
                hours.min(i64::MAX as u64) as i64,
            )
            .into())
        }
    };

    let report = state
        .reconcile
        .handle(ReconcilePendingCommand { max_age })
        .await?;
    Ok(Json(report).into_response())
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

fn is_admin(headers: &HeaderMap, expected: &SecretString) -> bool {
    let expected = expected.expose_secret();
    match bearer_token(headers) {
        Some(token) if !expected.is_empty() => token.as_bytes().ct_eq(expected.as_bytes()).into(),
        _ => false,
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// Converts `BillingError` into a status and JSON body.
///
/// Processor and persistence details are logged, never returned.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for BillingApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.0 {
            BillingError::Validation(err) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_FAILED", err.to_string())
            }
            BillingError::UnsupportedMethod(_) => (
                StatusCode::BAD_REQUEST,
                "UNSUPPORTED_PAYMENT_METHOD",
                self.0.to_string(),
            ),
            BillingError::Auth(_) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Authentication required".to_string(),
            ),
            BillingError::Processor(err) => {
                tracing::error!(error = %err, retryable = err.retryable, "payment processor call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "PAYMENT_PROVIDER_ERROR",
                    "The payment provider could not be reached. Please try again.".to_string(),
                )
            }
            BillingError::PaymentNotFound(id) => (
                StatusCode::NOT_FOUND,
                "PAYMENT_NOT_FOUND",
                format!("Payment {} not found", id),
            ),
            BillingError::Persistence(err) => {
                tracing::error!(error = %err, "billing persistence failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

/// Converts `WebhookError` into the status processors act on.
#[derive(Debug)]
pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let (code, message) = match &self.0 {
            WebhookError::InvalidSignature => ("INVALID_SIGNATURE", self.0.to_string()),
            WebhookError::MalformedPayload(_) => ("MALFORMED_PAYLOAD", self.0.to_string()),
            WebhookError::Persistence(detail) => {
                tracing::error!(error = %detail, "webhook processing failed, processor will retry");
                ("INTERNAL_ERROR", "Internal error".to_string())
            }
        };
        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::ProcessorError;
    use crate::domain::foundation::{AuthError, DomainError, PaymentId};
    use axum::http::{header, HeaderValue};

    fn status_of(err: BillingError) -> StatusCode {
        BillingApiError::from(err).into_response().status()
    }

    #[test]
    fn billing_errors_map_to_status_codes() {
        assert_eq!(
            status_of(ValidationError::empty_field("planId").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(BillingError::UnsupportedMethod(PaymentMethod::Manual)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AuthError::InvalidToken.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(ProcessorError::timeout("slow").into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(BillingError::PaymentNotFound(PaymentId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(DomainError::database("down").into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn processor_error_body_hides_provider_text() {
        let err = BillingError::from(ProcessorError::from_status(400, "sk_live_secret leaked"));
        let response = BillingApiError::from(err).into_response();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(body.contains("PAYMENT_PROVIDER_ERROR"));
        assert!(!body.contains("sk_live_secret"));
    }

    #[test]
    fn webhook_errors_map_to_status_codes() {
        let status = |err| WebhookApiError::from(err).into_response().status();
        assert_eq!(status(WebhookError::InvalidSignature), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(WebhookError::MalformedPayload("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(WebhookError::Persistence("db".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn admin_token_must_match_exactly() {
        let expected = SecretString::new("a".repeat(32));
        let mut headers = HeaderMap::new();
        assert!(!is_admin(&headers, &expected));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", "a".repeat(31))).unwrap(),
        );
        assert!(!is_admin(&headers, &expected));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", "a".repeat(32))).unwrap(),
        );
        assert!(is_admin(&headers, &expected));
    }

    #[test]
    fn empty_admin_token_never_matches() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer x"));
        assert!(!is_admin(&headers, &SecretString::new(String::new())));
    }
}
