//! Tinkoff Invest REST gateway client
//!
//! Talks to the JSON transcoding of the Invest API: every method is a POST to
//! `{base}/tinkoff.public.invest.api.contract.v1.<Service>/<Method>` with a
//! camelCase JSON body and a bearer token. int64 values (money units,
//! quantities) arrive as JSON strings; numbers are accepted as well.
//!
//! API Documentation: https://russianinvestments.github.io/investAPI/

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::result::{Error, Result};
use crate::domain::{Money, RawOperation};
use crate::ports::{BrokerAccount, OperationSource};

/// Default production gateway
pub const TINKOFF_PRODUCTION_URL: &str = "https://invest-public-api.tinkoff.ru/rest";

const CONTRACT: &str = "tinkoff.public.invest.api.contract.v1";

// =============================================================================
// API models
// =============================================================================

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    #[serde(default)]
    accounts: Vec<ApiAccount>,
}

#[derive(Debug, Deserialize)]
struct ApiAccount {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OperationsRequest<'a> {
    account_id: &'a str,
    from: String,
    to: String,
    state: &'static str,
}

/// Operations stay loose JSON, each record is decoded on its own
#[derive(Debug, Deserialize)]
struct OperationsResponse {
    #[serde(default)]
    operations: Vec<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

fn json_integer(value: JsonValue) -> std::result::Result<i64, String> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("integer out of range: {}", n)),
        JsonValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("invalid integer '{}': {}", s, e)),
        JsonValue::Null => Ok(0),
        _ => Err("expected number or string".to_string()),
    }
}

/// Deserialize ID that can be number or string
fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: JsonValue = Deserialize::deserialize(deserializer)?;
    match value {
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::String(s) => Ok(s),
        _ => Err(D::Error::custom("expected number or string for id")),
    }
}

/// Field as text: strings as-is, other scalars and structures as compact JSON
fn field_text(op: &JsonValue, key: &str) -> Option<String> {
    match op.get(key)? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// MoneyValue / Quotation; the raw JSON text is returned when it does not decode
fn payment_from_json(value: &JsonValue) -> (Option<Money>, Option<String>) {
    let decoded = value.as_object().and_then(|fields| {
        let units = json_integer(fields.get("units").cloned().unwrap_or_default()).ok()?;
        let nano = json_integer(fields.get("nano").cloned().unwrap_or_default()).ok()?;
        let nano = i32::try_from(nano).ok().filter(|n| n.abs() < 1_000_000_000)?;
        Some(Money::new(units, nano))
    });
    match decoded {
        Some(money) => (Some(money), None),
        None => (None, Some(value.to_string())),
    }
}

/// Converts one upstream record, falling back per field instead of failing
fn raw_operation(op: &JsonValue) -> RawOperation {
    let trade_id = op
        .get("trades")
        .and_then(JsonValue::as_array)
        .into_iter()
        .flatten()
        .find_map(|t| field_text(t, "tradeId").filter(|id| !id.is_empty()));
    let description = field_text(op, "description")
        .filter(|d| !d.is_empty())
        .or_else(|| field_text(op, "type"));
    let (payment, payment_raw) = match op.get("payment") {
        None | Some(JsonValue::Null) => (None, None),
        Some(value) => payment_from_json(value),
    };
    if let Some(raw) = &payment_raw {
        log::warn!(
            "Operation {} has an undecodable payment {}",
            field_text(op, "id").unwrap_or_default(),
            raw
        );
    }

    RawOperation {
        id: field_text(op, "id"),
        operation_id: field_text(op, "operationId"),
        trade_id,
        date: field_text(op, "date"),
        operation_type: field_text(op, "operationType"),
        state: field_text(op, "state"),
        currency: field_text(op, "currency"),
        payment,
        payment_raw,
        description,
    }
}

// =============================================================================
// HTTP client
// =============================================================================

/// Tinkoff Invest operation source
pub struct TinkoffSource {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl TinkoffSource {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        Self::new_with_base_url(TINKOFF_PRODUCTION_URL, timeout_secs)
    }

    pub fn new_with_base_url(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs,
        })
    }

    fn method_url(&self, service: &str, method: &str) -> String {
        format!("{}/{}.{}/{}", self.base_url, CONTRACT, service, method)
    }

    fn call<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        token: &str,
        service: &str,
        method: &str,
        body: &B,
    ) -> Result<T> {
        if token.trim().is_empty() {
            return Err(Error::config("INVEST_TOKEN is empty"));
        }

        let response = self
            .client
            .post(self.method_url(service, method))
            .bearer_auth(token)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .map_err(|e| self.map_request_error(e))?;

        let response = self.check_response_status(response, method)?;
        response
            .json::<T>()
            .map_err(|e| Error::upstream(format!("Failed to parse {} response: {}", method, e)))
    }

    fn map_request_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::upstream(format!(
                "Connection timed out after {} seconds",
                self.timeout_secs
            ))
        } else if error.is_connect() {
            Error::upstream("Unable to connect to the Tinkoff Invest API")
        } else {
            Error::upstream(format!("Tinkoff Invest request failed: {}", error))
        }
    }

    fn check_response_status(&self, response: Response, method: &str) -> Result<Response> {
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(response);
        }

        let detail = response
            .json::<ApiError>()
            .ok()
            .and_then(|e| e.description.filter(|d| !d.is_empty()).or(e.message))
            .unwrap_or_default();
        let reason = match status {
            401 => "authentication failed, the token may be invalid or revoked".to_string(),
            403 => "access denied, check the token permissions".to_string(),
            404 => "resource not found".to_string(),
            429 => "rate limit exceeded".to_string(),
            status => format!("HTTP {}", status),
        };

        if detail.is_empty() {
            Err(Error::upstream(format!("{}: {}", method, reason)))
        } else {
            Err(Error::upstream(format!("{}: {} ({})", method, reason, detail)))
        }
    }
}

impl OperationSource for TinkoffSource {
    fn name(&self) -> &str {
        "tinkoff"
    }

    fn get_accounts(&self, token: &str) -> Result<Vec<BrokerAccount>> {
        let response: AccountsResponse =
            self.call(token, "UsersService", "GetAccounts", &serde_json::json!({}))?;
        Ok(response
            .accounts
            .into_iter()
            .map(|a| BrokerAccount {
                id: a.id,
                name: a.name,
            })
            .collect())
    }

    fn get_operations(
        &self,
        token: &str,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawOperation>> {
        let request = OperationsRequest {
            account_id,
            from: from.to_rfc3339_opts(SecondsFormat::Millis, true),
            to: to.to_rfc3339_opts(SecondsFormat::Millis, true),
            state: "OPERATION_STATE_UNSPECIFIED",
        };
        let response: OperationsResponse =
            self.call(token, "OperationsService", "GetOperations", &request)?;
        Ok(response.operations.iter().map(raw_operation).collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::adapters::mock_http::{MockHttpServer, MockResponse};

    const OPERATIONS_BODY: &str = r#"{
        "operations": [
            {
                "id": "R123",
                "currency": "rub",
                "payment": {"currency": "rub", "units": "-500", "nano": 0},
                "state": "OPERATION_STATE_EXECUTED",
                "date": "2024-03-01T10:15:30.123456Z",
                "type": "Покупка ЦБ",
                "operationType": "OPERATION_TYPE_BUY",
                "trades": [{"tradeId": "T-77", "quantity": "1"}]
            },
            {
                "id": "",
                "currency": "rub",
                "payment": {"currency": "rub", "units": 12, "nano": 340000000},
                "state": "OPERATION_STATE_EXECUTED",
                "date": "2024-03-02T08:00:00Z",
                "type": "Выплата дивидендов",
                "operationType": "OPERATION_TYPE_DIVIDEND",
                "trades": []
            }
        ]
    }"#;

    fn broker() -> MockHttpServer {
        MockHttpServer::start(|req| {
            if req.header("authorization") != Some("Bearer t.valid") {
                return MockResponse::json(
                    401,
                    r#"{"code": 16, "message": "authentication error", "description": "40003"}"#,
                );
            }
            match req.path() {
                p if p.ends_with("UsersService/GetAccounts") => MockResponse::json(
                    200,
                    r#"{"accounts": [{"id": "2000123456", "name": "Брокерский счёт", "status": "ACCOUNT_STATUS_OPEN"}, {"id": 2000999, "name": "ИИС"}]}"#,
                ),
                p if p.ends_with("OperationsService/GetOperations") => {
                    MockResponse::json(200, OPERATIONS_BODY)
                }
                _ => MockResponse::json(404, r#"{"message": "not found"}"#),
            }
        })
        .unwrap()
    }

    #[test]
    fn test_get_accounts() {
        let server = broker();
        let source = TinkoffSource::new_with_base_url(&server.base_url(), 5).unwrap();

        let accounts = source.get_accounts("t.valid").unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id, "2000123456");
        assert_eq!(accounts[1].id, "2000999");

        let requests = server.requests();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(
            requests[0].path(),
            "/tinkoff.public.invest.api.contract.v1.UsersService/GetAccounts"
        );
    }

    #[test]
    fn test_get_operations() {
        let server = broker();
        let source = TinkoffSource::new_with_base_url(&server.base_url(), 5).unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();

        let ops = source.get_operations("t.valid", "2000123456", from, to).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].id.as_deref(), Some("R123"));
        assert_eq!(ops[0].trade_id.as_deref(), Some("T-77"));
        assert_eq!(ops[0].payment, Some(Money::new(-500, 0)));
        assert_eq!(ops[0].description.as_deref(), Some("Покупка ЦБ"));
        assert_eq!(ops[1].payment, Some(Money::new(12, 340_000_000)));
        assert_eq!(ops[1].trade_id, None);

        let body = server.requests()[0].json();
        assert_eq!(body["accountId"], "2000123456");
        assert_eq!(body["from"], "2024-01-01T00:00:00.000Z");
        assert_eq!(body["to"], "2024-04-01T00:00:00.000Z");
    }

    #[test]
    fn test_auth_failure_is_upstream_error() {
        let server = broker();
        let source = TinkoffSource::new_with_base_url(&server.base_url(), 5).unwrap();

        let err = source.get_accounts("t.revoked").unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
        let msg = err.to_string();
        assert!(msg.contains("authentication failed"), "{}", msg);
        assert!(msg.contains("40003"), "{}", msg);
    }

    #[test]
    fn test_undecodable_body_is_upstream_error() {
        let server = MockHttpServer::start(|_| MockResponse::json(200, "<html>oops</html>")).unwrap();
        let source = TinkoffSource::new_with_base_url(&server.base_url(), 5).unwrap();

        assert!(matches!(source.get_accounts("t.valid"), Err(Error::Upstream(_))));
    }

    #[test]
    fn test_connection_refused_is_upstream_error() {
        let source = TinkoffSource::new_with_base_url("http://127.0.0.1:1", 2).unwrap();
        assert!(matches!(source.get_accounts("t.valid"), Err(Error::Upstream(_))));
    }

    #[test]
    fn test_money_accepts_strings_and_numbers() {
        let money = payment_from_json(&serde_json::json!({"units": "-3", "nano": "-250000000"}));
        assert_eq!(money, (Some(Money::new(-3, -250_000_000)), None));
        let money = payment_from_json(&serde_json::json!({"units": 7}));
        assert_eq!(money, (Some(Money::new(7, 0)), None));
    }

    #[test]
    fn test_bad_payment_keeps_raw_text() {
        let (money, raw) = payment_from_json(&serde_json::json!({"units": "12.5", "nano": 0}));
        assert_eq!(money, None);
        assert_eq!(raw.as_deref(), Some(r#"{"nano":0,"units":"12.5"}"#));

        let (money, raw) = payment_from_json(&serde_json::json!({"units": 1, "nano": 5_000_000_000i64}));
        assert_eq!(money, None);
        assert!(raw.is_some());
    }

    #[test]
    fn test_malformed_operation_does_not_drop_batch() {
        let server = MockHttpServer::start(|_| {
            MockResponse::json(
                200,
                r#"{"operations": [
                    {"id": "A", "payment": {"units": "-500", "nano": 0}, "date": "2024-03-01T10:15:30Z", "operationType": "OPERATION_TYPE_BUY"},
                    {"id": "B", "payment": {"units": "12.5", "nano": 0}, "date": 1709287200, "operationType": "OPERATION_TYPE_DIVIDEND"}
                ]}"#,
            )
        })
        .unwrap();
        let source = TinkoffSource::new_with_base_url(&server.base_url(), 5).unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();

        let ops = source.get_operations("t.valid", "2000123456", from, to).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].payment, Some(Money::new(-500, 0)));
        assert_eq!(ops[1].id.as_deref(), Some("B"));
        assert_eq!(ops[1].payment, None);
        assert!(ops[1].payment_raw.as_deref().unwrap_or("").contains("12.5"));
        assert_eq!(ops[1].date.as_deref(), Some("1709287200"));
    }
}
