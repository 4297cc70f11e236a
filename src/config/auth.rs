//! Authentication configuration (OIDC bearer tokens)

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;
use crate::adapters::auth::JwksValidatorConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Token issuer; keys are read from `<issuer_url>/.well-known/jwks.json`.
    pub issuer_url: String,

    /// Audience the tokens must be minted for.
    pub audience: String,

    #[serde(default = "default_jwks_cache_ttl")]
    pub jwks_cache_ttl_secs: u64,
}

impl AuthConfig {
    pub fn validator_config(&self) -> JwksValidatorConfig {
        JwksValidatorConfig::new(&self.issuer_url, &self.audience)
            .with_cache_ttl(Duration::from_secs(self.jwks_cache_ttl_secs))
    }

    pub fn validate(&self, environment: Environment) -> Result<(), ValidationError> {
        if self.issuer_url.is_empty() {
            return Err(ValidationError::MissingRequired("auth.issuer_url"));
        }
        if self.audience.is_empty() {
            return Err(ValidationError::MissingRequired("auth.audience"));
        }
        if environment == Environment::Production && !self.issuer_url.starts_with("https://") {
            return Err(ValidationError::MustBeHttps("auth.issuer_url"));
        }
        Ok(())
    }
}

fn default_jwks_cache_ttl() -> u64 {
    3600
}
