//! Payment processor credentials.
//!
//! Keys come from the environment only, e.g.
//! `BILLING__PAYMENT__STRIPE_API_KEY=sk_test_...`.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;
use crate::adapters::mobile_money::MobileMoneyConfig;
use crate::adapters::stripe::StripeConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub stripe_api_key: SecretString,

    /// `whsec_...`. Without it Stripe webhooks are accepted unsigned, which
    /// is only allowed outside production.
    pub stripe_webhook_secret: Option<SecretString>,

    /// Overrides the Stripe API origin (test doubles, proxies).
    pub stripe_base_url: Option<String>,

    pub mobile_money_api_key: SecretString,

    /// Signs outbound requests (`X-Signature`).
    pub mobile_money_api_secret: SecretString,

    pub mobile_money_base_url: String,

    pub mobile_money_webhook_secret: Option<SecretString>,

    /// Outbound processor call timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl PaymentConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn is_stripe_live_mode(&self) -> bool {
        self.stripe_api_key.expose_secret().starts_with("sk_live_")
    }

    pub fn stripe(&self, environment: Environment) -> StripeConfig {
        let mut config = StripeConfig::new(self.stripe_api_key.clone())
            .with_webhook_secret(configured(&self.stripe_webhook_secret))
            .with_timeout(self.request_timeout())
            .with_require_livemode(
                environment == Environment::Production && self.is_stripe_live_mode(),
            );
        if let Some(base_url) = &self.stripe_base_url {
            config = config.with_base_url(base_url.clone());
        }
        config
    }

    pub fn mobile_money(&self) -> MobileMoneyConfig {
        MobileMoneyConfig::new(
            self.mobile_money_api_key.clone(),
            self.mobile_money_api_secret.clone(),
            self.mobile_money_base_url.clone(),
        )
        .with_webhook_secret(configured(&self.mobile_money_webhook_secret))
        .with_timeout(self.request_timeout())
    }

    pub fn validate(&self, environment: Environment) -> Result<(), ValidationError> {
        let production = environment == Environment::Production;

        let stripe_key = self.stripe_api_key.expose_secret();
        if stripe_key.is_empty() {
            return Err(ValidationError::MissingRequired("payment.stripe_api_key"));
        }
        if !stripe_key.starts_with("sk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        match configured(&self.stripe_webhook_secret) {
            Some(secret) if !secret.expose_secret().starts_with("whsec_") => {
                return Err(ValidationError::InvalidStripeWebhookSecret);
            }
            None if production => {
                return Err(ValidationError::MissingRequired("payment.stripe_webhook_secret"));
            }
            _ => {}
        }

        if self.mobile_money_api_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("payment.mobile_money_api_key"));
        }
        if self.mobile_money_api_secret.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("payment.mobile_money_api_secret"));
        }
        let base_url = self.mobile_money_base_url.as_str();
        if base_url.is_empty() {
            return Err(ValidationError::MissingRequired("payment.mobile_money_base_url"));
        }
        if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
            return Err(ValidationError::InvalidUrl("payment.mobile_money_base_url"));
        }
        if production && !base_url.starts_with("https://") {
            return Err(ValidationError::MustBeHttps("payment.mobile_money_base_url"));
        }
        if production && configured(&self.mobile_money_webhook_secret).is_none() {
            return Err(ValidationError::MissingRequired(
                "payment.mobile_money_webhook_secret",
            ));
        }

        if !(1..=60).contains(&self.request_timeout_secs) {
            return Err(ValidationError::OutOfRange {
                field: "payment.request_timeout_secs",
                min: 1,
                max: 60,
            });
        }
        Ok(())
    }
}

/// A blank secret (`VAR=` in the environment) counts as unset.
fn configured(secret: &Option<SecretString>) -> Option<SecretString> {
    secret
        .as_ref()
        .filter(|s| !s.expose_secret().trim().is_empty())
        .cloned()
}

fn default_request_timeout() -> u64 {
    10
}
