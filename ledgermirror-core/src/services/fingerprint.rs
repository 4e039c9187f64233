//! Operation identifier resolution
//!
//! The brokerage normally supplies an identifier. When it does not, a
//! fingerprint is derived from the raw fields so that re-fetching the same
//! operation yields the same key and the relational upsert stays idempotent.
//!
//! Known limitation: two operations without a native id and with identical
//! timestamp, type, currency, payment, state and description get the same
//! fingerprint and collapse into one relational row.

use sha2::{Digest, Sha256};

use crate::domain::RawOperation;

/// Resolve the stable identifier of a raw operation
///
/// Checks `id`, `operation_id` and `trade_id` in that order and returns the
/// first non-blank one unchanged. Falls back to [`fingerprint`].
pub fn resolve_id(raw: &RawOperation) -> String {
    [&raw.id, &raw.operation_id, &raw.trade_id]
        .into_iter()
        .flatten()
        .find(|id| !id.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| fingerprint(raw))
}

/// Deterministic non-negative integer derived from the raw fields
pub fn fingerprint(raw: &RawOperation) -> String {
    let payment = raw
        .payment
        .map(|m| m.to_string())
        .or_else(|| raw.payment_raw.clone())
        .unwrap_or_default();
    let material = format!(
        "{}|{}|{}|{}|{}|{}",
        raw.date.as_deref().unwrap_or(""),
        raw.operation_type.as_deref().unwrap_or(""),
        raw.currency.as_deref().unwrap_or(""),
        payment,
        raw.state.as_deref().unwrap_or(""),
        raw.description.as_deref().unwrap_or(""),
    );

    let digest = Sha256::digest(material.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    // Clear the top bit so the value also fits signed 64-bit columns
    let value = u64::from_be_bytes(prefix) & (u64::MAX >> 1);
    value.to_string()
}
