//! subscription-billing server.
//!
//! Loads configuration, connects PostgreSQL (and Redis when configured),
//! wires the processor adapters and serves the billing API until ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::Router;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subscription_billing::adapters::auth::JwksSessionValidator;
use subscription_billing::adapters::http::middleware::AuthState;
use subscription_billing::adapters::http::{billing_router, BillingAppState};
use subscription_billing::adapters::memory::InMemoryProcessedEventStore;
use subscription_billing::adapters::mobile_money::MobileMoneyAdapter;
use subscription_billing::adapters::postgres::PostgresPaymentRepository;
use subscription_billing::adapters::redis::RedisProcessedEventStore;
use subscription_billing::adapters::stripe::StripePaymentAdapter;
use subscription_billing::application::billing::{ProcessorRegistry, ReconcilePendingCommand};
use subscription_billing::config::{AppConfig, ConfigError, RedisConfig, ServerConfig};
use subscription_billing::domain::billing::ProcessorError;
use subscription_billing::domain::foundation::AuthError;
use subscription_billing::ports::ProcessedEventStore;

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("payment processor client: {0}")]
    Processor(#[from] ProcessorError),

    #[error("token validator: {0}")]
    Auth(#[from] AuthError),

    #[error("server: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = AppConfig::load_validated()?;
    init_tracing(&config.server);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "starting subscription-billing"
    );

    let pool = config.database.pool_options().connect(&config.database.url).await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("database migrations applied");
    }
    let repository = Arc::new(PostgresPaymentRepository::new(pool));

    let env = config.server.environment;
    let stripe = Arc::new(StripePaymentAdapter::new(config.payment.stripe(env))?);
    let mobile_money = Arc::new(MobileMoneyAdapter::new(config.payment.mobile_money())?);
    let processors = ProcessorRegistry::new()
        .with(stripe.clone())
        .with(mobile_money.clone());

    let event_store = processed_event_store(config.redis.as_ref()).await;

    let state = BillingAppState::builder(
        repository,
        processors,
        config.reconciliation.admin_token.clone(),
    )
    .decoder(stripe)
    .decoder(mobile_money)
    .event_store(event_store)
    .sweep_settings(config.reconciliation.sweep_settings())
    .default_max_age(config.reconciliation.max_age())
    .build();

    let validator: AuthState = Arc::new(JwksSessionValidator::new(config.auth.validator_config())?);

    let sweeper = config
        .reconciliation
        .interval()
        .map(|every| spawn_sweeper(state.clone(), every, config.reconciliation.max_age()));

    let app = with_http_layers(
        billing_router(state, validator, config.server.request_timeout()),
        &config.server,
    );

    let addr = config.server.socket_addr().map_err(ConfigError::from)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    tracing::info!("shut down");
    Ok(())
}

/// JSON logs in production, human-readable otherwise. `RUST_LOG` wins over
/// the configured directive.
fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if server.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Redis when configured and reachable; otherwise an in-memory store, which
/// only loses the duplicate short-circuit across restarts.
async fn processed_event_store(settings: Option<&RedisConfig>) -> Arc<dyn ProcessedEventStore> {
    let Some(settings) = settings else {
        return Arc::new(InMemoryProcessedEventStore::new());
    };

    let connect = async {
        let client = redis::Client::open(settings.url.as_str())?;
        Ok::<_, redis::RedisError>(client.get_multiplexed_tokio_connection().await?)
    };

    match tokio::time::timeout(settings.connect_timeout(), connect).await {
        Ok(Ok(conn)) => {
            tracing::info!("processed webhook events tracked in redis");
            Arc::new(RedisProcessedEventStore::new(conn).with_retention(settings.event_retention()))
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "redis unavailable, tracking processed events in memory");
            Arc::new(InMemoryProcessedEventStore::new())
        }
        Err(_) => {
            tracing::warn!("redis connect timed out, tracking processed events in memory");
            Arc::new(InMemoryProcessedEventStore::new())
        }
    }
}

fn with_http_layers(router: Router, server: &ServerConfig) -> Router {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    // Request timeouts are applied per route group by `billing_router`.
    // Outermost last: the request id is assigned before tracing starts.
    router
        .layer(CorsLayer::new().allow_origin(AllowOrigin::list(origins)))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn spawn_sweeper(state: BillingAppState, every: Duration, max_age: Duration) -> JoinHandle<()> {
    tracing::info!(interval_secs = every.as_secs(), "interval reconciliation enabled");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; let the server settle first.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = state.reconcile.handle(ReconcilePendingCommand { max_age }).await {
                tracing::error!(error = %e, "scheduled reconciliation failed");
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
