//! Webhook signature verification.
//!
//! Both processors sign webhook bodies with HMAC-SHA256 under a shared
//! secret. The mobile-money gateway sends the hex MAC of the raw body; Stripe
//! sends `t=<unix>,v1=<hex>` and signs `"{t}.{body}"`.
//!
//! Verification always works on the raw request bytes and never returns an
//! error: anything malformed is simply not verified.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::domain::foundation::Timestamp;

type HmacSha256 = Hmac<Sha256>;

/// Default maximum age for timestamped signatures (5 minutes).
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Maximum allowed clock skew for timestamps in the future (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Why a signature header could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("malformed signature header: {0}")]
    MalformedHeader(&'static str),

    #[error("signature timestamp outside tolerance")]
    TimestampOutOfRange,

    #[error("signature mismatch")]
    Mismatch,
}

/// Parsed `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when the signature was generated.
    pub timestamp: i64,
    /// Every `v1` signature present (several during secret rotation).
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses `t=<timestamp>,v1=<signature>[,v1=<signature>...]`.
    ///
    /// Unknown keys are ignored. Undecodable `v1` values are skipped.
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or(SignatureError::MalformedHeader("expected key=value pairs"))?;

            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse()
                            .map_err(|_| SignatureError::MalformedHeader("invalid timestamp"))?,
                    );
                }
                "v1" => {
                    if let Ok(sig) = hex::decode(value) {
                        v1_signatures.push(sig);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MalformedHeader("missing timestamp"))?;
        if v1_signatures.is_empty() {
            return Err(SignatureError::MalformedHeader("missing v1 signature"));
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

/// Verifies a hex HMAC-SHA256 of `raw_body`.
///
/// An optional `sha256=` prefix on the received signature is accepted.
/// Returns false for an empty secret, undecodable hex, wrong length or mismatch.
pub fn verify(secret: &str, raw_body: &[u8], received_signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let received = received_signature.trim();
    let received = received.strip_prefix("sha256=").unwrap_or(received);
    let Ok(received) = hex::decode(received) else {
        return false;
    };
    match compute_mac(secret, &[raw_body]) {
        Some(expected) => constant_time_compare(&expected, &received),
        None => false,
    }
}

/// Verifies a Stripe-style timestamped signature header.
pub fn verify_timestamped(
    secret: &str,
    raw_body: &[u8],
    header: &str,
    now: Timestamp,
    tolerance_secs: i64,
) -> bool {
    check_timestamped(secret, raw_body, header, now, tolerance_secs).is_ok()
}

/// Same as [`verify_timestamped`] but reports the reason for rejection.
pub fn check_timestamped(
    secret: &str,
    raw_body: &[u8],
    header: &str,
    now: Timestamp,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::Mismatch);
    }
    let header = SignatureHeader::parse(header)?;

    let age = now.as_unix_secs().saturating_sub(header.timestamp);
    if age > tolerance_secs || age < -MAX_CLOCK_SKEW_SECS {
        return Err(SignatureError::TimestampOutOfRange);
    }

    let timestamp = header.timestamp.to_string();
    let expected = compute_mac(secret, &[timestamp.as_bytes(), b".", raw_body])
        .ok_or(SignatureError::Mismatch)?;

    // Evaluate every candidate so timing does not reveal which one matched.
    let matched = header
        .v1_signatures
        .iter()
        .fold(false, |acc, candidate| {
            constant_time_compare(&expected, candidate) | acc
        });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Hex HMAC-SHA256 of `raw_body`, as a sender would compute it.
pub fn sign(secret: &str, raw_body: &[u8]) -> String {
    compute_mac(secret, &[raw_body])
        .map(hex::encode)
        .unwrap_or_default()
}

/// Builds a `t=..,v1=..` header for `raw_body` signed at `timestamp`.
pub fn sign_timestamped(secret: &str, raw_body: &[u8], timestamp: i64) -> String {
    let ts = timestamp.to_string();
    let mac = compute_mac(secret, &[ts.as_bytes(), b".", raw_body])
        .map(hex::encode)
        .unwrap_or_default();
    format!("t={},v1={}", timestamp, mac)
}

fn compute_mac(secret: &str, parts: &[&[u8]]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    for part in parts {
        mac.update(part);
    }
    Some(mac.finalize().into_bytes().to_vec())
}

/// Constant-time comparison; unequal lengths fail immediately.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
