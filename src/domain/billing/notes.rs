//! Free-text audit trail attached to a payment.
//!
//! Notes are `key=value` entries joined by `"; "`. Besides audit, they carry
//! the checkout URL and any session id so a payment opened with a local
//! placeholder transaction id can still be correlated later.

use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: &str = "; ";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentNotes(String);

impl PaymentNotes {
    /// Wraps notes loaded from storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Builder-style append.
    pub fn with(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.append(key, value);
        self
    }

    /// Appends a `key=value` entry. Separators inside the value are replaced.
    pub fn append(&mut self, key: &str, value: impl AsRef<str>) {
        let value = value.as_ref().replace(';', ",");
        if !self.0.is_empty() {
            self.0.push_str(SEPARATOR);
        }
        self.0.push_str(key);
        self.0.push('=');
        self.0.push_str(value.trim());
    }

    /// Returns the last value recorded under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .split(';')
            .filter_map(|entry| entry.trim().split_once('='))
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v)
            .last()
            .filter(|v| !v.is_empty())
    }

    /// Substring match used by the correlation fallback.
    pub fn contains(&self, fragment: &str) -> bool {
        !fragment.is_empty() && self.0.contains(fragment)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentNotes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
