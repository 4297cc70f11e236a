//! Purchasable plans and their entitlement windows.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Timestamp, ValidationError};

/// Days of access granted by a recurring plan per verified payment.
pub const RECURRING_PLAN_DAYS: i64 = 30;

/// Days of access granted by a short-term plan.
pub const SHORT_TERM_PLAN_DAYS: i64 = 7;

/// Plan purchased at checkout.
///
/// Stored on both the payment and the subscription so the entitlement can be
/// derived from the payment record alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    /// Unlimited analyses, renewed every 30 days.
    Unlimited,

    /// Monthly plan, renewed every 30 days.
    Monthly,

    /// One week of access.
    Weekly,

    /// A single analysis report, accessible for a week.
    SingleAnalysis,
}

impl PlanType {
    /// Returns the stable identifier stored in the datastore and sent as processor metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Unlimited => "unlimited",
            PlanType::Monthly => "monthly",
            PlanType::Weekly => "weekly",
            PlanType::SingleAnalysis => "single_analysis",
        }
    }

    /// Returns true for plans that renew on a monthly cadence.
    pub fn is_recurring(&self) -> bool {
        matches!(self, PlanType::Unlimited | PlanType::Monthly)
    }

    /// Number of days of access a verified payment grants.
    pub fn validity_days(&self) -> i64 {
        if self.is_recurring() {
            RECURRING_PLAN_DAYS
        } else {
            SHORT_TERM_PLAN_DAYS
        }
    }

    /// Expiry for a payment verified at `verified_at`.
    pub fn expires_at(&self, verified_at: Timestamp) -> Timestamp {
        verified_at.add_days(self.validity_days())
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unlimited" => Ok(PlanType::Unlimited),
            "monthly" => Ok(PlanType::Monthly),
            "weekly" => Ok(PlanType::Weekly),
            "single_analysis" | "single" => Ok(PlanType::SingleAnalysis),
            "" => Err(ValidationError::empty_field("plan_id")),
            other => Err(ValidationError::invalid_format(
                "plan_id",
                format!("unknown plan '{}'", other),
            )),
        }
    }
}
