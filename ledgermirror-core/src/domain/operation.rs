//! Operation domain model
//!
//! `RawOperation` is the fixed-shape record handed over by a brokerage source.
//! Every field is optional so that a partially broken upstream record can still
//! travel through the pipeline. `Operation` is the canonical row every sink
//! receives.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Column names of the canonical row, in wire order.
///
/// Shared by the CSV snapshot, the relational table and the spreadsheet header.
pub const OPERATION_COLUMNS: [&str; 7] = [
    "operation_id",
    "date_msk",
    "action",
    "amount",
    "currency",
    "status",
    "description",
];

/// Monetary value split into integer units and billionths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub units: i64,
    /// Fractional part in 10^-9, carries the same sign as `units` upstream
    pub nano: i32,
}

impl Money {
    pub fn new(units: i64, nano: i32) -> Self {
        Self { units, nano }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "units={} nano={}", self.units, self.nano)
    }
}

/// An operation as reported by the brokerage, before normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOperation {
    /// Primary identifier
    pub id: Option<String>,
    /// Secondary identifier used by some API versions
    pub operation_id: Option<String>,
    /// Exchange trade identifier, present for executed trades
    pub trade_id: Option<String>,
    /// Source timestamp, RFC 3339 when well-formed
    pub date: Option<String>,
    /// Operation type enum name (e.g. `OPERATION_TYPE_BUY`)
    pub operation_type: Option<String>,
    /// Operation state enum name (e.g. `OPERATION_STATE_EXECUTED`)
    pub state: Option<String>,
    pub currency: Option<String>,
    pub payment: Option<Money>,
    /// Upstream payment text when it could not be decoded into `Money`
    pub payment_raw: Option<String>,
    pub description: Option<String>,
}

/// Canonical ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: String,
    /// `YYYY-MM-DD HH:MM:SS` in the reporting timezone
    #[serde(rename = "date_msk")]
    pub timestamp_local: String,
    /// Localized operation type label
    #[serde(rename = "action")]
    pub category: String,
    /// Two-decimal fixed point string, sign carries direction
    pub amount: String,
    pub currency: String,
    /// Localized state label
    pub status: String,
    pub description: String,
}

impl Operation {
    /// Amount as a decimal, `None` when normalization had to fall back
    pub fn amount_decimal(&self) -> Option<Decimal> {
        self.amount.parse::<Decimal>().ok()
    }

    /// Field values in `OPERATION_COLUMNS` order
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.operation_id.clone(),
            self.timestamp_local.clone(),
            self.category.clone(),
            self.amount.clone(),
            self.currency.clone(),
            self.status.clone(),
            self.description.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Operation {
        Operation {
            operation_id: "op-1".to_string(),
            timestamp_local: "2024-03-01 13:15:30".to_string(),
            category: "Покупка ценных бумаг".to_string(),
            amount: "-500.00".to_string(),
            currency: "rub".to_string(),
            status: "Проведена".to_string(),
            description: "Покупка ЦБ".to_string(),
        }
    }

    #[test]
    fn test_record_order_matches_columns() {
        let record = sample().to_record();
        assert_eq!(record.len(), OPERATION_COLUMNS.len());
        assert_eq!(record[0], "op-1");
        assert_eq!(record[3], "-500.00");
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        for column in OPERATION_COLUMNS {
            assert!(keys.contains(&column), "missing column {}", column);
        }
    }

    #[test]
    fn test_amount_decimal_fallback() {
        let mut op = sample();
        assert_eq!(op.amount_decimal(), Some(Decimal::new(-50000, 2)));

        op.amount = "units=1 nano=2000000000".to_string();
        assert_eq!(op.amount_decimal(), None);
    }
}
