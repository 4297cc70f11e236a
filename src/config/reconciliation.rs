//! Reconciliation sweep configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;
use crate::application::handlers::billing::SweepSettings;

/// Shortest admin token accepted in production.
pub const MIN_ADMIN_TOKEN_LEN: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    /// Default look-back for pending payments.
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,

    #[serde(default = "default_sweep_deadline")]
    pub sweep_deadline_secs: u64,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,

    /// When set, a sweep also runs in-process on this interval.
    pub interval_secs: Option<u64>,

    /// Bearer token for `POST /api/billing/reconcile`.
    pub admin_token: SecretString,
}

impl ReconciliationConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours * 3600)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(Duration::from_secs)
    }

    pub fn sweep_settings(&self) -> SweepSettings {
        SweepSettings {
            deadline: Duration::from_secs(self.sweep_deadline_secs),
            concurrency: self.concurrency,
            batch_limit: self.batch_limit,
        }
    }

    pub fn validate(&self, environment: Environment) -> Result<(), ValidationError> {
        let token = self.admin_token.expose_secret();
        if token.is_empty() {
            return Err(ValidationError::MissingRequired("reconciliation.admin_token"));
        }
        if environment == Environment::Production && token.len() < MIN_ADMIN_TOKEN_LEN {
            return Err(ValidationError::AdminTokenTooShort(MIN_ADMIN_TOKEN_LEN));
        }
        check_range("reconciliation.max_age_hours", self.max_age_hours, 1, 24 * 30)?;
        check_range("reconciliation.sweep_deadline_secs", self.sweep_deadline_secs, 1, 900)?;
        check_range("reconciliation.concurrency", self.concurrency as u64, 1, 32)?;
        check_range("reconciliation.batch_limit", self.batch_limit as u64, 1, 10_000)?;
        if let Some(interval) = self.interval_secs {
            // A sweep must finish before the next one starts.
            check_range(
                "reconciliation.interval_secs",
                interval,
                self.sweep_deadline_secs,
                u64::MAX,
            )?;
        }
        Ok(())
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange { field, min, max })
    }
}

fn default_max_age_hours() -> u64 {
    72
}

fn default_sweep_deadline() -> u64 {
    50
}

fn default_concurrency() -> usize {
    4
}

fn default_batch_limit() -> u32 {
    500
}
