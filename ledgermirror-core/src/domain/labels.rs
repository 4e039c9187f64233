//! Localized labels for brokerage enums
//!
//! Both lookups are total: names missing from the tables are returned verbatim.

const OPERATION_TYPE_LABELS: &[(&str, &str)] = &[
    ("OPERATION_TYPE_BUY", "Покупка ценных бумаг"),
    ("OPERATION_TYPE_SELL", "Продажа ценных бумаг"),
    ("OPERATION_TYPE_BROKER_FEE", "Комиссия брокера"),
    ("OPERATION_TYPE_SERVICE_FEE", "Удержание комиссии"),
    ("OPERATION_TYPE_TAX", "Удержание налога"),
    ("OPERATION_TYPE_TAX_DIVIDEND", "Налог на дивиденды"),
    ("OPERATION_TYPE_DIVIDEND", "Выплата дивидендов"),
    ("OPERATION_TYPE_COUPON", "Выплата купона"),
    ("OPERATION_TYPE_INPUT", "Ввод денежных средств"),
    ("OPERATION_TYPE_OUTPUT", "Вывод денежных средств"),
    ("OPERATION_TYPE_OPTION_EXPIRATION", "Экспирация опциона"),
    ("OPERATION_TYPE_WRITE_OFF_MONEY", "Списание средств"),
    ("OPERATION_TYPE_PAY_IN", "Пополнение"),
    ("OPERATION_TYPE_PAY_OUT", "Вывод"),
];

const OPERATION_STATE_LABELS: &[(&str, &str)] = &[
    ("OPERATION_STATE_EXECUTED", "Проведена"),
    ("OPERATION_STATE_DECLINED", "Отклонена"),
    ("OPERATION_STATE_PROGRESS", "В обработке"),
];

fn lookup(table: &[(&str, &str)], name: &str) -> String {
    table
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Label for an operation type enum name
pub fn operation_type_label(name: &str) -> String {
    lookup(OPERATION_TYPE_LABELS, name)
}

/// Label for an operation state enum name
pub fn operation_state_label(name: &str) -> String {
    lookup(OPERATION_STATE_LABELS, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_labels() {
        assert_eq!(operation_type_label("OPERATION_TYPE_BUY"), "Покупка ценных бумаг");
        assert_eq!(operation_type_label("OPERATION_TYPE_DIVIDEND"), "Выплата дивидендов");
        assert_eq!(operation_state_label("OPERATION_STATE_EXECUTED"), "Проведена");
    }

    #[test]
    fn test_unknown_labels_pass_through() {
        assert_eq!(
            operation_type_label("OPERATION_TYPE_MARGIN_FEE"),
            "OPERATION_TYPE_MARGIN_FEE"
        );
        assert_eq!(operation_state_label("OPERATION_STATE_UNSPECIFIED"), "OPERATION_STATE_UNSPECIFIED");
        assert_eq!(operation_type_label(""), "");
    }
}
