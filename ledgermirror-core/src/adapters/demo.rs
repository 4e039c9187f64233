//! Demo operation source
//!
//! Produces a small deterministic brokerage history for offline runs:
//! a deposit, trades, fees, a dividend with its tax, a coupon, and one
//! operation without any native identifier. Dates are laid out relative to
//! the end of the requested window.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::domain::result::Result;
use crate::domain::{Money, RawOperation};
use crate::ports::{BrokerAccount, OperationSource};

pub const DEMO_ACCOUNT_ID: &str = "demo-2000000001";

struct DemoOperation {
    id: Option<&'static str>,
    trade_id: Option<&'static str>,
    days_before_end: i64,
    operation_type: &'static str,
    state: &'static str,
    units: i64,
    nano: i32,
    description: &'static str,
}

const DEMO_OPERATIONS: &[DemoOperation] = &[
    DemoOperation {
        id: Some("demo-op-001"),
        trade_id: None,
        days_before_end: 60,
        operation_type: "OPERATION_TYPE_INPUT",
        state: "OPERATION_STATE_EXECUTED",
        units: 100_000,
        nano: 0,
        description: "Пополнение брокерского счёта",
    },
    DemoOperation {
        id: Some("demo-op-002"),
        trade_id: Some("demo-trade-002"),
        days_before_end: 58,
        operation_type: "OPERATION_TYPE_BUY",
        state: "OPERATION_STATE_EXECUTED",
        units: -27_450,
        nano: -500_000_000,
        description: "Покупка ЦБ",
    },
    DemoOperation {
        id: Some("demo-op-003"),
        trade_id: None,
        days_before_end: 58,
        operation_type: "OPERATION_TYPE_BROKER_FEE",
        state: "OPERATION_STATE_EXECUTED",
        units: -13,
        nano: -730_000_000,
        description: "Удержание комиссии за операцию",
    },
    DemoOperation {
        id: Some("demo-op-004"),
        trade_id: None,
        days_before_end: 30,
        operation_type: "OPERATION_TYPE_DIVIDEND",
        state: "OPERATION_STATE_EXECUTED",
        units: 1_245,
        nano: 600_000_000,
        description: "Выплата дивидендов",
    },
    DemoOperation {
        id: Some("demo-op-005"),
        trade_id: None,
        days_before_end: 30,
        operation_type: "OPERATION_TYPE_TAX_DIVIDEND",
        state: "OPERATION_STATE_EXECUTED",
        units: -161,
        nano: -930_000_000,
        description: "Удержание налога на дивиденды",
    },
    DemoOperation {
        id: None,
        trade_id: None,
        days_before_end: 14,
        operation_type: "OPERATION_TYPE_COUPON",
        state: "OPERATION_STATE_EXECUTED",
        units: 37,
        nano: 400_000_000,
        description: "Выплата купонов",
    },
    DemoOperation {
        id: Some("demo-op-007"),
        trade_id: Some("demo-trade-007"),
        days_before_end: 3,
        operation_type: "OPERATION_TYPE_SELL",
        state: "OPERATION_STATE_EXECUTED",
        units: 9_120,
        nano: 0,
        description: "Продажа ЦБ",
    },
    DemoOperation {
        id: Some("demo-op-008"),
        trade_id: None,
        days_before_end: 1,
        operation_type: "OPERATION_TYPE_OUTPUT",
        state: "OPERATION_STATE_PROGRESS",
        units: -5_000,
        nano: 0,
        description: "Вывод денежных средств",
    },
];

/// Deterministic offline source
#[derive(Debug, Default)]
pub struct DemoSource;

impl DemoSource {
    pub fn new() -> Self {
        Self
    }
}

/// Demo operations inside `[from, to)`, oldest first
pub fn demo_operations(from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<RawOperation> {
    DEMO_OPERATIONS
        .iter()
        .enumerate()
        .filter_map(|(index, op)| {
            // Spread same-day operations a few minutes apart
            let at = to - Duration::days(op.days_before_end) + Duration::minutes(index as i64);
            if at < from || at >= to {
                return None;
            }
            Some(RawOperation {
                id: op.id.map(str::to_string),
                operation_id: None,
                trade_id: op.trade_id.map(str::to_string),
                date: Some(at.to_rfc3339_opts(SecondsFormat::Micros, true)),
                operation_type: Some(op.operation_type.to_string()),
                state: Some(op.state.to_string()),
                currency: Some("rub".to_string()),
                payment: Some(Money::new(op.units, op.nano)),
                payment_raw: None,
                description: Some(op.description.to_string()),
            })
        })
        .collect()
}

impl OperationSource for DemoSource {
    fn name(&self) -> &str {
        "demo"
    }

    fn get_accounts(&self, _token: &str) -> Result<Vec<BrokerAccount>> {
        Ok(vec![BrokerAccount {
            id: DEMO_ACCOUNT_ID.to_string(),
            name: Some("Демо брокерский счёт".to_string()),
        }])
    }

    fn get_operations(
        &self,
        _token: &str,
        _account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawOperation>> {
        Ok(demo_operations(from, to))
    }
}
