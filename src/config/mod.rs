//! Application configuration.
//!
//! Loaded from environment variables with the `BILLING` prefix and `__`
//! between nesting levels, after reading a `.env` file when present:
//!
//! - `BILLING__SERVER__PORT=8080` -> `server.port`
//! - `BILLING__DATABASE__URL=postgres://...` -> `database.url`
//! - `BILLING__PAYMENT__STRIPE_API_KEY=sk_test_...` -> `payment.stripe_api_key`
//!
//! ```no_run
//! use subscription_billing::config::AppConfig;
//!
//! let config = AppConfig::load_validated().expect("invalid configuration");
//! println!("listening on {}", config.server.port);
//! ```

mod auth;
mod database;
mod error;
mod payment;
mod reconciliation;
mod redis;
mod server;

pub use auth::AuthConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use reconciliation::{ReconciliationConfig, MIN_ADMIN_TOKEN_LEN};
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

const ENV_PREFIX: &str = "BILLING";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    /// Absent: processed webhook ids are kept in memory.
    #[serde(default)]
    pub redis: Option<RedisConfig>,

    pub auth: AuthConfig,

    pub payment: PaymentConfig,

    pub reconciliation: ReconciliationConfig,
}

impl AppConfig {
    /// Reads `.env` (if any) and the process environment.
    ///
    /// # Errors
    ///
    /// `ConfigError::LoadError` when a required value is missing or cannot be
    /// parsed into its field type.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// `load` followed by `validate`; what the binary calls at startup.
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section. Production additionally requires HTTPS
    /// endpoints, webhook secrets and a long admin token.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let env = self.server.environment;
        self.server.validate()?;
        self.database.validate()?;
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }
        self.auth.validate(env)?;
        self.payment.validate(env)?;
        self.reconciliation.validate(env)?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Environment variables are process-global.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const MINIMAL_ENV: &[(&str, &str)] = &[
        ("BILLING__DATABASE__URL", "postgres://billing@localhost/billing"),
        ("BILLING__AUTH__ISSUER_URL", "https://id.example.com"),
        ("BILLING__AUTH__AUDIENCE", "billing-api"),
        ("BILLING__PAYMENT__STRIPE_API_KEY", "sk_test_xxx"),
        ("BILLING__PAYMENT__STRIPE_WEBHOOK_SECRET", "whsec_xxx"),
        ("BILLING__PAYMENT__MOBILE_MONEY_API_KEY", "mm-key"),
        ("BILLING__PAYMENT__MOBILE_MONEY_API_SECRET", "mm-secret"),
        ("BILLING__PAYMENT__MOBILE_MONEY_BASE_URL", "https://pay.example.com"),
        ("BILLING__PAYMENT__MOBILE_MONEY_WEBHOOK_SECRET", "mm-hook"),
        ("BILLING__RECONCILIATION__ADMIN_TOKEN", "0123456789abcdef0123456789abcdef"),
    ];

    const EXTRA_KEYS: &[&str] = &[
        "BILLING__SERVER__PORT",
        "BILLING__SERVER__ENVIRONMENT",
        "BILLING__REDIS__URL",
        "BILLING__RECONCILIATION__INTERVAL_SECS",
    ];

    /// Runs `f` with the minimal environment plus `extra`, then cleans up.
    fn with_env<T>(extra: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        for (k, v) in MINIMAL_ENV.iter().chain(extra) {
            env::set_var(k, v);
        }
        let result = f();
        for (k, _) in MINIMAL_ENV {
            env::remove_var(k);
        }
        for k in EXTRA_KEYS {
            env::remove_var(k);
        }
        result
    }

    #[test]
    fn loads_minimal_environment_with_defaults() {
        let config = with_env(&[], AppConfig::load).unwrap();

        assert_eq!(config.database.url, "postgres://billing@localhost/billing");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.payment.request_timeout_secs, 10);
        assert_eq!(config.reconciliation.max_age_hours, 72);
        assert_eq!(config.reconciliation.concurrency, 4);
        assert!(config.redis.is_none());
        assert!(config.reconciliation.interval_secs.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn nested_overrides_are_parsed() {
        let config = with_env(
            &[
                ("BILLING__SERVER__PORT", "3000"),
                ("BILLING__SERVER__ENVIRONMENT", "production"),
                ("BILLING__REDIS__URL", "redis://localhost:6379"),
                ("BILLING__RECONCILIATION__INTERVAL_SECS", "600"),
            ],
            AppConfig::load_validated,
        )
        .unwrap();

        assert_eq!(config.server.port, 3000);
        assert!(config.is_production());
        assert_eq!(
            config.redis.as_ref().map(|r| r.url.as_str()),
            Some("redis://localhost:6379")
        );
        assert_eq!(config.reconciliation.interval_secs, Some(600));
    }

    #[test]
    fn missing_section_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("BILLING__DATABASE__URL", "postgres://localhost/billing");
        let result = AppConfig::load();
        env::remove_var("BILLING__DATABASE__URL");

        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }
}
