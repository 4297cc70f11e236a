//! Processor correlation ids.
//!
//! When a processor does not hand back a session id at checkout time the
//! payment is stored with a local placeholder transaction id. The real
//! processor id is then recovered from the payment notes.

use serde::Serialize;

use crate::domain::foundation::{Timestamp, UserId};

use super::notes::PaymentNotes;
use super::payment::PaymentRecord;

/// Prefix that marks a locally generated transaction id.
pub const PLACEHOLDER_PREFIX: &str = "local_";

/// Note keys written at checkout and consulted during correlation.
pub mod keys {
    pub const PLAN: &str = "plan";
    pub const SESSION_ID: &str = "session_id";
    pub const INVOICE_ID: &str = "invoice_id";
    pub const CHECKOUT_URL: &str = "checkout_url";
    pub const FAILURE_REASON: &str = "failure_reason";
    pub const AMOUNT_MISMATCH: &str = "amount_mismatch";
}

/// Builds `local_<unix-millis>_<first 8 chars of the user id>`.
pub fn placeholder_transaction_id(user_id: &UserId, at: Timestamp) -> String {
    let short_user: String = user_id.as_str().chars().take(8).collect();
    format!("{}{}_{}", PLACEHOLDER_PREFIX, at.as_unix_millis(), short_user)
}

pub fn is_placeholder(transaction_id: &str) -> bool {
    transaction_id.trim().is_empty() || transaction_id.starts_with(PLACEHOLDER_PREFIX)
}

/// Where a processor correlation id was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationSource {
    TransactionId,
    Notes,
}

/// Derives the id to send to the processor's status endpoint.
///
/// Uses the transaction id unless it is a placeholder, in which case the notes
/// are searched for `session_id`, then `invoice_id`, then the last path
/// segment of `checkout_url`.
pub fn processor_reference(record: &PaymentRecord) -> Option<(String, CorrelationSource)> {
    if !is_placeholder(&record.transaction_id) {
        return Some((record.transaction_id.clone(), CorrelationSource::TransactionId));
    }
    reference_from_notes(&record.notes).map(|id| (id, CorrelationSource::Notes))
}

fn reference_from_notes(notes: &PaymentNotes) -> Option<String> {
    notes
        .get(keys::SESSION_ID)
        .or_else(|| notes.get(keys::INVOICE_ID))
        .map(str::to_string)
        .filter(|id| !is_placeholder(id))
        .or_else(|| notes.get(keys::CHECKOUT_URL).and_then(last_path_segment))
}

fn last_path_segment(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next()?;
    let path = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let (_, path) = path.split_once('/')?;
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}
