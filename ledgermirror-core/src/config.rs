//! Configuration management
//!
//! Settings come from a flat key/value map: an optional `config.env` file
//! overlaid by the process environment. The map is parsed once into a typed
//! `Config`; nothing below this module reads the environment.
//!
//! ```text
//! SOURCE=tinkoff
//! INVEST_TOKEN=t.xxxxx
//! DAYS_BACK=30
//! BUCKET_NAME=ledger
//! YA_ACCESS_KEY=...
//! YA_SECRET_KEY=...
//! DUCKDB_PATH=/var/lib/ledgermirror/operations.duckdb
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono_tz::Tz;
use serde::Serialize;

use crate::adapters::duckdb::{validate_table_name, DEFAULT_TABLE};
use crate::adapters::s3::{DEFAULT_ENDPOINT, DEFAULT_REGION};
use crate::adapters::sheets::SHEETS_API_URL;
use crate::adapters::tinkoff::TINKOFF_PRODUCTION_URL;
use crate::domain::result::{Error, Result};
use crate::services::{Normalizer, DEFAULT_REPORTING_TZ};

/// Env file read when none is given explicitly
pub const DEFAULT_ENV_FILE: &str = "config.env";

const DEFAULT_DAYS_BACK: u32 = 1000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WORKSHEET: &str = "Sheet1";

/// Keys whose values never appear in `describe()` output
const SECRET_KEYS: &[&str] = &[
    "INVEST_TOKEN",
    "YA_ACCESS_KEY",
    "YA_SECRET_KEY",
    "SUPABASE_KEY",
    "GSHEETS_ACCESS_TOKEN",
];

/// Every key `Config` understands, in display order
pub const KNOWN_KEYS: &[&str] = &[
    "SOURCE",
    "INVEST_TOKEN",
    "INVEST_API_URL",
    "DAYS_BACK",
    "REPORTING_TZ",
    "HTTP_TIMEOUT_SECS",
    "YA_ACCESS_KEY",
    "YA_SECRET_KEY",
    "BUCKET_NAME",
    "S3_ENDPOINT",
    "S3_REGION",
    "S3_KEY_PREFIX",
    "OBJECT_STORE_DIR",
    "DUCKDB_PATH",
    "SUPABASE_URL",
    "SUPABASE_KEY",
    "RELATIONAL_TABLE",
    "GSHEETS_ACCESS_TOKEN",
    "GSHEETS_SPREADSHEET",
    "GSHEETS_WORKSHEET",
    "LEDGERMIRROR_DIR",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Tinkoff,
    Demo,
}

impl FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tinkoff" => Ok(Self::Tinkoff),
            "demo" => Ok(Self::Demo),
            other => Err(Error::config(format!(
                "Unknown SOURCE '{}' (expected tinkoff or demo)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub enum ObjectStoreSettings {
    S3(S3Settings),
    Local(PathBuf),
}

#[derive(Debug, Clone)]
pub enum RelationalSettings {
    DuckDb(PathBuf),
    Postgrest { url: String, key: String },
}

#[derive(Debug, Clone)]
pub struct SheetsSettings {
    pub api_url: String,
    pub access_token: String,
    pub spreadsheet: String,
    pub worksheet: String,
}

/// Typed application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceKind,
    pub token: String,
    pub api_url: String,
    pub days_back: u32,
    pub reporting_tz: Tz,
    pub http_timeout_secs: u64,
    pub object_store: Option<ObjectStoreSettings>,
    pub key_prefix: String,
    pub relational: Option<RelationalSettings>,
    pub relational_table: String,
    pub sheets: Option<SheetsSettings>,
    /// Data directory for the event log; the CLI falls back to `~/.ledgermirror`
    pub data_dir: Option<PathBuf>,
}

/// Non-empty trimmed value for a key
fn value<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_number<T: FromStr>(vars: &HashMap<String, String>, key: &str, default: T) -> Result<T> {
    match value(vars, key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::config(format!("{} must be a non-negative integer, got '{}'", key, raw))),
        None => Ok(default),
    }
}

/// All-or-nothing group of keys
fn group<'a, const N: usize>(
    vars: &'a HashMap<String, String>,
    keys: [&str; N],
) -> Result<Option<[&'a str; N]>> {
    let values = keys.map(|k| value(vars, k));
    let present = values.iter().filter(|v| v.is_some()).count();
    if present == 0 {
        return Ok(None);
    }
    if present < N {
        let missing: Vec<&str> = keys
            .iter()
            .zip(values.iter())
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| *k)
            .collect();
        return Err(Error::config(format!(
            "{} set without {}",
            keys.join("/"),
            missing.join(", ")
        )));
    }
    Ok(Some(values.map(|v| v.unwrap_or_default())))
}

fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

impl Config {
    /// Parse a key/value map
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let source = match value(vars, "SOURCE") {
            Some(raw) => raw.parse()?,
            None => SourceKind::Tinkoff,
        };
        let token = value(vars, "INVEST_TOKEN").unwrap_or_default().to_string();
        if source == SourceKind::Tinkoff && token.is_empty() {
            return Err(Error::config("INVEST_TOKEN is required for SOURCE=tinkoff"));
        }

        let days_back = parse_number(vars, "DAYS_BACK", DEFAULT_DAYS_BACK)?;
        if days_back < 1 {
            return Err(Error::config("DAYS_BACK must be at least 1"));
        }
        let http_timeout_secs = parse_number(vars, "HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?;
        if http_timeout_secs == 0 {
            return Err(Error::config("HTTP_TIMEOUT_SECS must be at least 1"));
        }
        let reporting_tz = Normalizer::for_timezone(
            value(vars, "REPORTING_TZ").unwrap_or(DEFAULT_REPORTING_TZ),
        )?
        .timezone();

        let s3 = group(vars, ["YA_ACCESS_KEY", "YA_SECRET_KEY", "BUCKET_NAME"])?.map(
            |[access_key, secret_key, bucket]| S3Settings {
                endpoint: value(vars, "S3_ENDPOINT").unwrap_or(DEFAULT_ENDPOINT).to_string(),
                region: value(vars, "S3_REGION").unwrap_or(DEFAULT_REGION).to_string(),
                bucket: bucket.to_string(),
                access_key: access_key.to_string(),
                secret_key: secret_key.to_string(),
            },
        );
        let local_dir = value(vars, "OBJECT_STORE_DIR").map(PathBuf::from);
        let object_store = match (s3, local_dir) {
            (Some(_), Some(_)) => {
                return Err(Error::config(
                    "Both S3 (BUCKET_NAME) and OBJECT_STORE_DIR are set; choose one object store",
                ))
            }
            (Some(s3), None) => Some(ObjectStoreSettings::S3(s3)),
            (None, Some(dir)) => Some(ObjectStoreSettings::Local(dir)),
            (None, None) => None,
        };

        let postgrest = group(vars, ["SUPABASE_URL", "SUPABASE_KEY"])?;
        let duckdb = value(vars, "DUCKDB_PATH").map(PathBuf::from);
        let relational = match (postgrest, duckdb) {
            (Some(_), Some(_)) => {
                return Err(Error::config(
                    "Both SUPABASE_URL and DUCKDB_PATH are set; choose one relational store",
                ))
            }
            (Some([url, key]), None) => Some(RelationalSettings::Postgrest {
                url: url.to_string(),
                key: key.to_string(),
            }),
            (None, Some(path)) => Some(RelationalSettings::DuckDb(path)),
            (None, None) => None,
        };
        let relational_table = value(vars, "RELATIONAL_TABLE")
            .unwrap_or(DEFAULT_TABLE)
            .to_string();
        validate_table_name(&relational_table)?;

        let sheets = group(vars, ["GSHEETS_ACCESS_TOKEN", "GSHEETS_SPREADSHEET"])?.map(
            |[access_token, spreadsheet]| SheetsSettings {
                api_url: SHEETS_API_URL.to_string(),
                access_token: access_token.to_string(),
                spreadsheet: spreadsheet.to_string(),
                worksheet: value(vars, "GSHEETS_WORKSHEET")
                    .unwrap_or(DEFAULT_WORKSHEET)
                    .to_string(),
            },
        );

        Ok(Self {
            source,
            token,
            api_url: value(vars, "INVEST_API_URL")
                .unwrap_or(TINKOFF_PRODUCTION_URL)
                .to_string(),
            days_back,
            reporting_tz,
            http_timeout_secs,
            object_store,
            key_prefix: value(vars, "S3_KEY_PREFIX").unwrap_or_default().to_string(),
            relational,
            relational_table,
            sheets,
            data_dir: value(vars, "LEDGERMIRROR_DIR").map(PathBuf::from),
        })
    }

    /// Read the env file (if any) and overlay the process environment
    ///
    /// An explicitly named file must exist; the default `config.env` is
    /// optional. The process environment is never modified.
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        Self::from_vars(&Self::collect_vars(env_file)?)
    }

    /// Merged key/value map used by `load`
    pub fn collect_vars(env_file: Option<&Path>) -> Result<HashMap<String, String>> {
        let mut vars = HashMap::new();

        let (path, required) = match env_file {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_ENV_FILE), false),
        };
        if path.exists() {
            let entries = dotenvy::from_path_iter(&path).map_err(|e| {
                Error::config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            for entry in entries {
                let (key, val) = entry.map_err(|e| {
                    Error::config(format!("Failed to parse {}: {}", path.display(), e))
                })?;
                vars.insert(key, val);
            }
            log::debug!("Loaded settings from {}", path.display());
        } else if required {
            return Err(Error::config(format!(
                "Env file {} does not exist",
                path.display()
            )));
        }

        for key in KNOWN_KEYS {
            if let Ok(val) = std::env::var(key) {
                vars.insert(key.to_string(), val);
            }
        }
        Ok(vars)
    }

    /// Names of the sinks this configuration enables, in replication order
    pub fn sink_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.object_store.is_some() {
            names.push(crate::services::OBJECT_STORE_SINK);
        }
        if self.relational.is_some() {
            names.push(crate::services::RELATIONAL_SINK);
        }
        if self.sheets.is_some() {
            names.push(crate::services::SPREADSHEET_SINK);
        }
        names
    }

    /// Key/value view of a raw map with secrets masked
    pub fn describe(vars: &HashMap<String, String>) -> Vec<(String, Option<String>)> {
        KNOWN_KEYS
            .iter()
            .map(|key| {
                let shown = value(vars, key).map(|v| {
                    if SECRET_KEYS.contains(key) {
                        mask(v)
                    } else {
                        v.to_string()
                    }
                });
                (key.to_string(), shown)
            })
            .collect()
    }
}
