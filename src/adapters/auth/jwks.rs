//! OIDC bearer-token validation against the identity provider's JWKS.
//!
//! Tokens are accepted when the signature verifies against a key published
//! at `<issuer>/.well-known/jwks.json` and the `iss`, `aud` and `exp` claims
//! match. Keys are cached and refetched once the cache ages out or a token
//! names a `kid` the cache does not know (key rotation).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{JwkSet, KeyAlgorithm};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::domain::foundation::{AuthError, AuthenticatedUser, UserId};
use crate::ports::SessionValidator;

#[derive(Debug, Clone)]
pub struct JwksValidatorConfig {
    /// Expected `iss`, also the base of the JWKS URL.
    pub issuer_url: String,
    /// Expected entry in `aud`.
    pub audience: String,
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
}

impl JwksValidatorConfig {
    pub fn new(issuer_url: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            audience: audience.into(),
            cache_ttl: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn jwks_url(&self) -> String {
        format!("{}/.well-known/jwks.json", self.issuer_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

pub struct JwksSessionValidator {
    config: JwksValidatorConfig,
    http_client: reqwest::Client,
    cache: Arc<RwLock<Option<CachedKeys>>>,
}

impl JwksSessionValidator {
    /// Keys are fetched lazily, on the first validation.
    pub fn new(config: JwksValidatorConfig) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::service_unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            cache: Arc::new(RwLock::new(None)),
        })
    }

    async fn fetch_keys(&self) -> Result<JwkSet, AuthError> {
        let url = self.config.jwks_url();
        let response = self.http_client.get(&url).send().await.map_err(|e| {
            tracing::error!(%url, error = %e, "JWKS fetch failed");
            AuthError::service_unavailable("identity provider unreachable")
        })?;

        if !response.status().is_success() {
            tracing::error!(%url, status = %response.status(), "JWKS endpoint returned an error");
            return Err(AuthError::service_unavailable("identity provider returned an error"));
        }

        let keys: JwkSet = response.json().await.map_err(|e| {
            tracing::error!(%url, error = %e, "JWKS response unreadable");
            AuthError::service_unavailable("identity provider sent an invalid key set")
        })?;

        let mut cache = self.cache.write().await;
        *cache = Some(CachedKeys {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }

    /// Cached keys when fresh and containing `kid`; otherwise a refetch.
    async fn keys_for(&self, kid: &str) -> Result<JwkSet, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                let fresh = cached.fetched_at.elapsed() < self.config.cache_ttl;
                if fresh && cached.keys.find(kid).is_some() {
                    return Ok(cached.keys.clone());
                }
            }
        }
        self.fetch_keys().await
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[&self.config.issuer_url]);
        validation.set_audience(&[&self.config.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation
    }
}

fn algorithm_for(key_algorithm: Option<KeyAlgorithm>) -> Result<Algorithm, AuthError> {
    match key_algorithm {
        None | Some(KeyAlgorithm::RS256) => Ok(Algorithm::RS256),
        Some(KeyAlgorithm::RS384) => Ok(Algorithm::RS384),
        Some(KeyAlgorithm::RS512) => Ok(Algorithm::RS512),
        Some(KeyAlgorithm::ES256) => Ok(Algorithm::ES256),
        Some(KeyAlgorithm::ES384) => Ok(Algorithm::ES384),
        Some(other) => {
            tracing::warn!(algorithm = ?other, "token signed with unsupported algorithm");
            Err(AuthError::InvalidToken)
        }
    }
}

#[async_trait]
impl SessionValidator for JwksSessionValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::InvalidToken)?;
        let kid = header.kid.ok_or(AuthError::InvalidToken)?;

        let keys = self.keys_for(&kid).await?;
        let jwk = keys.find(&kid).ok_or_else(|| {
            tracing::warn!(%kid, "token signed with unknown key");
            AuthError::InvalidToken
        })?;

        let algorithm = algorithm_for(jwk.common.key_algorithm)?;
        let key = DecodingKey::from_jwk(jwk).map_err(|_| AuthError::InvalidToken)?;

        let data = decode::<Claims>(token, &key, &self.validation(algorithm)).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                kind => {
                    tracing::debug!(?kind, "token rejected");
                    AuthError::InvalidToken
                }
            }
        })?;

        let claims = data.claims;
        let user_id = UserId::new(claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthenticatedUser::new(
            user_id,
            claims.email.unwrap_or_default(),
            claims.name.or(claims.preferred_username),
        ))
    }
}

impl std::fmt::Debug for JwksSessionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksSessionValidator")
            .field("issuer_url", &self.config.issuer_url)
            .field("audience", &self.config.audience)
            .finish_non_exhaustive()
    }
}
