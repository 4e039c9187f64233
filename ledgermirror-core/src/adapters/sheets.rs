//! Google Sheets v4 values client
//!
//! Uses a pre-issued OAuth access token. Values are written with
//! `valueInputOption=RAW` so amounts and ids are stored as typed.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use url::Url;

use crate::domain::result::{Error, Result};
use crate::ports::SpreadsheetClient;

pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com";

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    #[serde(default)]
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    #[serde(default)]
    updated_rows: Option<usize>,
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Google Sheets client bound to one worksheet
pub struct GoogleSheetsClient {
    client: Client,
    base_url: Url,
    access_token: String,
    spreadsheet_id: String,
    worksheet: String,
}

impl GoogleSheetsClient {
    pub fn new(
        access_token: &str,
        spreadsheet_id: &str,
        worksheet: &str,
        timeout_secs: u64,
    ) -> Result<Self> {
        Self::new_with_base_url(SHEETS_API_URL, access_token, spreadsheet_id, worksheet, timeout_secs)
    }

    pub fn new_with_base_url(
        base_url: &str,
        access_token: &str,
        spreadsheet_id: &str,
        worksheet: &str,
        timeout_secs: u64,
    ) -> Result<Self> {
        if access_token.trim().is_empty() {
            return Err(Error::config("GSHEETS_ACCESS_TOKEN cannot be empty"));
        }
        if spreadsheet_id.trim().is_empty() {
            return Err(Error::config("GSHEETS_SPREADSHEET cannot be empty"));
        }
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("Invalid Sheets API URL '{}': {}", base_url, e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            access_token: access_token.to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            worksheet: worksheet.to_string(),
        })
    }

    /// A1 range covering row 1 of the worksheet
    fn first_row_range(&self) -> String {
        format!("'{}'!1:1", self.worksheet.replace('\'', "''"))
    }

    fn sheet_range(&self) -> String {
        format!("'{}'!A1", self.worksheet.replace('\'', "''"))
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::config("Sheets API URL cannot be a base"))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .map_err(|e| Error::spreadsheet(format!("{}: {}", what, e)))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        let reason = match status.as_u16() {
            401 => "access token invalid or expired".to_string(),
            403 => "permission denied on the spreadsheet".to_string(),
            404 => "spreadsheet not found".to_string(),
            code => format!("HTTP {}", code),
        };
        log::debug!("Sheets {} failed: {}", what, body);
        Err(Error::spreadsheet(format!("{}: {}", what, reason)))
    }
}

impl SpreadsheetClient for GoogleSheetsClient {
    fn target(&self) -> String {
        format!("gsheets://{}/{}", self.spreadsheet_id, self.worksheet)
    }

    fn ensure_sheet(&self) -> Result<()> {
        let url = self.url(&[])?;
        let response = self.send(
            self.client
                .get(url)
                .query(&[("fields", "sheets.properties.title")]),
            "read spreadsheet",
        )?;
        let meta: SpreadsheetMeta = response
            .json()
            .map_err(|e| Error::spreadsheet(format!("read spreadsheet: {}", e)))?;
        if meta.sheets.iter().any(|s| s.properties.title == self.worksheet) {
            return Ok(());
        }

        log::info!("Creating worksheet {}", self.worksheet);
        let url = self.url(&[])?;
        let batch_url = format!("{}:batchUpdate", url);
        self.send(
            self.client.post(batch_url).json(&serde_json::json!({
                "requests": [{"addSheet": {"properties": {"title": self.worksheet}}}]
            })),
            "add worksheet",
        )?;
        Ok(())
    }

    fn read_first_row(&self) -> Result<Vec<String>> {
        let range = self.first_row_range();
        let url = self.url(&["values", &range])?;
        let response = self.send(self.client.get(url), "read header")?;
        let values: ValueRange = response
            .json()
            .map_err(|e| Error::spreadsheet(format!("read header: {}", e)))?;
        Ok(values
            .values
            .into_iter()
            .next()
            .unwrap_or_default()
            .iter()
            .map(cell_text)
            .collect())
    }

    fn write_first_row(&self, values: &[String]) -> Result<()> {
        let range = self.first_row_range();
        let url = self.url(&["values", &range])?;
        self.send(
            self.client
                .put(url)
                .query(&[("valueInputOption", "RAW")])
                .json(&serde_json::json!({
                    "range": range,
                    "majorDimension": "ROWS",
                    "values": [values],
                })),
            "write header",
        )?;
        Ok(())
    }

    fn append_rows(&self, rows: &[Vec<String>]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let range = format!("{}:append", self.sheet_range());
        let url = self.url(&["values", &range])?;
        let response = self.send(
            self.client
                .post(url)
                .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
                .json(&serde_json::json!({ "majorDimension": "ROWS", "values": rows })),
            "append rows",
        )?;
        let appended: AppendResponse = response
            .json()
            .map_err(|e| Error::spreadsheet(format!("append rows: {}", e)))?;
        Ok(appended
            .updates
            .and_then(|u| u.updated_rows)
            .unwrap_or(rows.len()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::adapters::mock_http::{MockHttpServer, MockResponse};

    /// Minimal Sheets API holding one document
    fn fake_sheets() -> MockHttpServer {
        let titles = Arc::new(Mutex::new(vec!["Sheet1".to_string()]));
        let rows: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
        MockHttpServer::start(move |req| {
            if req.header("authorization") != Some("Bearer ya29.token") {
                return MockResponse::json(401, r#"{"error":{"code":401}}"#);
            }
            let path = req.path().to_string();
            if !path.starts_with("/v4/spreadsheets/doc-1") {
                return MockResponse::json(404, r#"{"error":{"code":404}}"#);
            }
            let mut rows = rows.lock().unwrap();
            let mut titles = titles.lock().unwrap();
            if req.method == "GET" && path == "/v4/spreadsheets/doc-1" {
                let sheets: Vec<_> = titles
                    .iter()
                    .map(|t| serde_json::json!({"properties": {"title": t}}))
                    .collect();
                return MockResponse::json(200, &serde_json::json!({ "sheets": sheets }).to_string());
            }
            if req.method == "POST" && path.ends_with(":batchUpdate") {
                let title = req.json()["requests"][0]["addSheet"]["properties"]["title"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                titles.push(title);
                return MockResponse::json(200, "{}");
            }
            if req.method == "GET" && path.contains("/values/") {
                let body = match rows.first() {
                    Some(first) => serde_json::json!({ "values": [first] }),
                    None => serde_json::json!({}),
                };
                return MockResponse::json(200, &body.to_string());
            }
            if req.method == "PUT" && path.contains("/values/") {
                let header = req.json()["values"][0].clone();
                if rows.is_empty() {
                    rows.push(header);
                } else {
                    rows[0] = header;
                }
                return MockResponse::json(200, "{}");
            }
            if req.method == "POST" && path.ends_with(":append") {
                let new_rows = req.json()["values"].as_array().cloned().unwrap_or_default();
                let count = new_rows.len();
                rows.extend(new_rows);
                return MockResponse::json(
                    200,
                    &serde_json::json!({ "updates": { "updatedRows": count } }).to_string(),
                );
            }
            MockResponse::json(400, "{}")
        })
        .unwrap()
    }

    fn client(server: &MockHttpServer, worksheet: &str) -> GoogleSheetsClient {
        GoogleSheetsClient::new_with_base_url(&server.base_url(), "ya29.token", "doc-1", worksheet, 5)
            .unwrap()
    }

    #[test]
    fn test_header_and_append() {
        let server = fake_sheets();
        let sheets = client(&server, "Sheet1");

        sheets.ensure_sheet().unwrap();
        assert!(sheets.read_first_row().unwrap().is_empty());
        sheets
            .write_first_row(&["operation_id".to_string(), "date_msk".to_string()])
            .unwrap();
        assert_eq!(sheets.read_first_row().unwrap(), vec!["operation_id", "date_msk"]);

        let appended = sheets
            .append_rows(&[
                vec!["1".to_string(), "2024-03-01 13:15:30".to_string()],
                vec!["2".to_string(), "2024-03-02 11:00:00".to_string()],
            ])
            .unwrap();
        assert_eq!(appended, 2);

        let append = server
            .requests()
            .into_iter()
            .find(|r| r.path().ends_with(":append"))
            .unwrap();
        assert!(append.query().contains("valueInputOption=RAW"));
        assert!(append.path().contains("%27Sheet1%27!A1:append") || append.path().contains("'Sheet1'!A1:append"));
    }

    #[test]
    fn test_missing_worksheet_is_created() {
        let server = fake_sheets();
        let sheets = client(&server, "Операции");

        sheets.ensure_sheet().unwrap();
        assert!(server
            .requests()
            .iter()
            .any(|r| r.path().ends_with(":batchUpdate")));
    }

    #[test]
    fn test_bad_token() {
        let server = fake_sheets();
        let sheets =
            GoogleSheetsClient::new_with_base_url(&server.base_url(), "expired", "doc-1", "Sheet1", 5)
                .unwrap();
        let err = sheets.read_first_row().unwrap_err();
        assert!(matches!(err, Error::Spreadsheet(_)));
        assert!(err.to_string().contains("invalid or expired"));
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&serde_json::json!("x")), "x");
        assert_eq!(cell_text(&serde_json::json!(12.5)), "12.5");
        assert_eq!(cell_text(&serde_json::Value::Null), "");
    }
}
