//! Operation normalizer - raw brokerage records to canonical rows
//!
//! Normalization never fails. A field that cannot be converted degrades to a
//! best-effort string and the row is still emitted, so downstream row counts
//! always match fetched counts.

use chrono::DateTime;
use chrono_tz::Tz;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::labels::{operation_state_label, operation_type_label};
use crate::domain::result::{Error, Result};
use crate::domain::{Money, Operation, RawOperation};
use crate::services::fingerprint::resolve_id;

/// Default reporting timezone
pub const DEFAULT_REPORTING_TZ: &str = "Europe/Moscow";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NANOS_PER_UNIT: i64 = 1_000_000_000;

/// Converts raw operations into canonical rows for a fixed reporting timezone
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    timezone: Tz,
}

impl Normalizer {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Build from an IANA timezone name
    pub fn for_timezone(name: &str) -> Result<Self> {
        let timezone: Tz = name
            .parse()
            .map_err(|e| Error::config(format!("Unknown reporting timezone '{}': {}", name, e)))?;
        Ok(Self::new(timezone))
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Normalize one raw operation
    pub fn normalize(&self, raw: &RawOperation) -> Operation {
        Operation {
            operation_id: resolve_id(raw),
            timestamp_local: self.local_timestamp(raw.date.as_deref()),
            category: operation_type_label(raw.operation_type.as_deref().unwrap_or("")),
            amount: raw
                .payment
                .map(|m| money_to_string(&m))
                .or_else(|| raw.payment_raw.clone())
                .unwrap_or_default(),
            currency: raw.currency.clone().unwrap_or_default(),
            status: operation_state_label(raw.state.as_deref().unwrap_or("")),
            description: raw.description.clone().unwrap_or_default(),
        }
    }

    /// Normalize a batch, preserving order
    pub fn normalize_all(&self, raws: &[RawOperation]) -> Vec<Operation> {
        raws.iter().map(|raw| self.normalize(raw)).collect()
    }

    /// Convert an offset-carrying timestamp to the reporting timezone.
    /// Anything else is passed through unchanged.
    pub fn local_timestamp(&self, raw: Option<&str>) -> String {
        let Some(raw) = raw else {
            return String::new();
        };
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(dt) => dt
                .with_timezone(&self.timezone)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            Err(_) => raw.to_string(),
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(chrono_tz::Europe::Moscow)
    }
}

/// Combine units and nano into a decimal rounded half-up to two places
///
/// The value is negative when either part is negative.
pub fn money_to_decimal(money: &Money) -> Option<Decimal> {
    let nano = i64::from(money.nano);
    if nano.abs() >= NANOS_PER_UNIT {
        return None;
    }
    let negative = money.units < 0 || nano < 0;
    let magnitude = Decimal::from(money.units.unsigned_abs()) + Decimal::new(nano.abs(), 9);
    let mut value = magnitude.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    value.rescale(2);
    if negative {
        value.set_sign_negative(true);
    }
    Some(value)
}

/// Two-decimal string for a money value, raw representation on failure
pub fn money_to_string(money: &Money) -> String {
    match money_to_decimal(money) {
        Some(value) => value.to_string(),
        None => money.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_payment(units: i64, nano: i32) -> RawOperation {
        RawOperation {
            id: Some("op-1".to_string()),
            date: Some("2024-03-01T10:15:30.123456Z".to_string()),
            operation_type: Some("OPERATION_TYPE_BUY".to_string()),
            state: Some("OPERATION_STATE_EXECUTED".to_string()),
            currency: Some("rub".to_string()),
            payment: Some(Money::new(units, nano)),
            description: Some("Покупка ЦБ".to_string()),
            ..RawOperation::default()
        }
    }

    #[test]
    fn test_amount_examples() {
        assert_eq!(money_to_string(&Money::new(100, 500_000_000)), "100.50");
        assert_eq!(money_to_string(&Money::new(-1, -990_000_000)), "-1.99");
        assert_eq!(money_to_string(&Money::new(-500, 0)), "-500.00");
        assert_eq!(money_to_string(&Money::new(12, 340_000_000)), "12.34");
        assert_eq!(money_to_string(&Money::new(0, 0)), "0.00");
    }

    #[test]
    fn test_amount_sign_from_either_part() {
        assert_eq!(money_to_string(&Money::new(0, -250_000_000)), "-0.25");
        assert_eq!(money_to_string(&Money::new(-3, 0)), "-3.00");
    }

    #[test]
    fn test_amount_rounds_half_up() {
        assert_eq!(money_to_string(&Money::new(1, 5_000_000)), "1.01");
        assert_eq!(money_to_string(&Money::new(1, 4_999_999)), "1.00");
        assert_eq!(money_to_string(&Money::new(-1, -5_000_000)), "-1.01");
        assert_eq!(money_to_string(&Money::new(2, 995_000_000)), "3.00");
    }

    #[test]
    fn test_amount_out_of_range_nano_falls_back() {
        let money = Money::new(1, 1_500_000_000);
        assert_eq!(money_to_decimal(&money), None);
        assert_eq!(money_to_string(&money), "units=1 nano=1500000000");
    }

    #[test]
    fn test_timestamp_converted_to_moscow() {
        let normalizer = Normalizer::default();
        assert_eq!(
            normalizer.local_timestamp(Some("2024-03-01T10:15:30.123456Z")),
            "2024-03-01 13:15:30"
        );
        assert_eq!(
            normalizer.local_timestamp(Some("2024-12-31T23:30:00+00:00")),
            "2025-01-01 02:30:00"
        );
    }

    #[test]
    fn test_timestamp_fallbacks() {
        let normalizer = Normalizer::default();
        assert_eq!(normalizer.local_timestamp(Some("2024-03-01 10:15:30")), "2024-03-01 10:15:30");
        assert_eq!(normalizer.local_timestamp(Some("yesterday")), "yesterday");
        assert_eq!(normalizer.local_timestamp(None), "");
    }

    #[test]
    fn test_other_timezone() {
        let normalizer = Normalizer::for_timezone("UTC").unwrap();
        assert_eq!(normalizer.local_timestamp(Some("2024-03-01T10:15:30Z")), "2024-03-01 10:15:30");
        assert!(Normalizer::for_timezone("Mars/Olympus_Mons").is_err());
    }

    #[test]
    fn test_normalize_full_row() {
        let op = Normalizer::default().normalize(&raw_with_payment(-500, 0));
        assert_eq!(op.operation_id, "op-1");
        assert_eq!(op.timestamp_local, "2024-03-01 13:15:30");
        assert_eq!(op.category, "Покупка ценных бумаг");
        assert_eq!(op.amount, "-500.00");
        assert_eq!(op.currency, "rub");
        assert_eq!(op.status, "Проведена");
        assert_eq!(op.description, "Покупка ЦБ");
    }

    #[test]
    fn test_normalize_empty_row_still_emitted() {
        let op = Normalizer::default().normalize(&RawOperation::default());
        assert!(!op.operation_id.is_empty());
        assert_eq!(op.timestamp_local, "");
        assert_eq!(op.category, "");
        assert_eq!(op.amount, "");
        assert_eq!(op.status, "");
    }

    #[test]
    fn test_undecoded_payment_passes_through() {
        let raw = RawOperation {
            payment: None,
            payment_raw: Some(r#"{"nano":0,"units":"12.5"}"#.to_string()),
            ..raw_with_payment(0, 0)
        };
        let op = Normalizer::default().normalize(&raw);
        assert_eq!(op.amount, r#"{"nano":0,"units":"12.5"}"#);
        assert_eq!(op.amount_decimal(), None);
        assert_eq!(op.category, "Покупка ценных бумаг");
    }

    #[test]
    fn test_normalize_all_preserves_order_and_count() {
        let raws = vec![
            raw_with_payment(1, 0),
            RawOperation::default(),
            raw_with_payment(2, 0),
        ];
        let rows = Normalizer::default().normalize_all(&raws);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].amount, "1.00");
        assert_eq!(rows[2].amount, "2.00");
    }
}
