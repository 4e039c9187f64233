//! S3-compatible object store (Yandex Object Storage by default)
//!
//! Path-style requests (`{endpoint}/{bucket}/{key}`) signed with AWS
//! Signature Version 4. Only the three calls the sinks need are implemented:
//! PutObject, GetObject and ListObjectsV2.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::Method;
use sha2::{Digest, Sha256};
use url::Url;

use crate::domain::result::{Error, Result};
use crate::ports::{ObjectInfo, ObjectStore};

pub const DEFAULT_ENDPOINT: &str = "https://storage.yandexcloud.net";
pub const DEFAULT_REGION: &str = "ru-central1";

const SERVICE: &str = "s3";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Signature Version 4
// =============================================================================

/// Percent-encode per SigV4 rules: unreserved characters stay, everything
/// else becomes `%XX`. `/` is kept when encoding object paths.
pub fn uri_encode(input: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if keep_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::Other(format!("HMAC key rejected: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derive the SigV4 signing key for one day, region and service
pub fn signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Credentials and scope used to sign requests
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

/// Everything that goes into a canonical request
pub struct CanonicalRequest<'a> {
    pub method: &'a str,
    /// Already URI-encoded path
    pub path: &'a str,
    /// Unencoded query parameters
    pub query: &'a [(String, String)],
    /// Header name/value pairs to sign
    pub headers: &'a [(String, String)],
    pub payload_hash: &'a str,
}

impl CanonicalRequest<'_> {
    fn canonical_query(&self) -> String {
        let mut pairs: Vec<(String, String)> = self
            .query
            .iter()
            .map(|(k, v)| (uri_encode(k, false), uri_encode(v, false)))
            .collect();
        pairs.sort();
        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn sorted_headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
            .collect();
        headers.sort();
        headers
    }

    fn signed_headers(&self) -> String {
        self.sorted_headers()
            .into_iter()
            .map(|(k, _)| k)
            .collect::<Vec<_>>()
            .join(";")
    }

    fn render(&self) -> String {
        let canonical_headers: String = self
            .sorted_headers()
            .into_iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.method,
            self.path,
            self.canonical_query(),
            canonical_headers,
            self.signed_headers(),
            self.payload_hash
        )
    }
}

/// Authorization header value for a request made at `amz_date`
/// (`YYYYMMDDTHHMMSSZ`)
pub fn authorization_header(
    credentials: &Credentials,
    request: &CanonicalRequest<'_>,
    amz_date: &str,
) -> Result<String> {
    let date = amz_date.get(..8).ok_or_else(|| Error::Other("malformed x-amz-date".into()))?;
    let scope = format!("{}/{}/{}/aws4_request", date, credentials.region, SERVICE);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        sha256_hex(request.render().as_bytes())
    );
    let key = signing_key(&credentials.secret_key, date, &credentials.region, SERVICE)?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM,
        credentials.access_key,
        scope,
        request.signed_headers(),
        signature
    ))
}

// =============================================================================
// ListObjectsV2 parsing
// =============================================================================

fn xml_unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

struct ListPage {
    objects: Vec<ObjectInfo>,
    next_token: Option<String>,
}

struct ListParser {
    contents: Regex,
    key: Regex,
    last_modified: Regex,
    size: Regex,
    truncated: Regex,
    next_token: Regex,
}

impl ListParser {
    fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::Other(format!("list pattern: {}", e)))
        };
        Ok(Self {
            contents: compile(r"(?s)<Contents>(.*?)</Contents>")?,
            key: compile(r"(?s)<Key>(.*?)</Key>")?,
            last_modified: compile(r"<LastModified>(.*?)</LastModified>")?,
            size: compile(r"<Size>(\d+)</Size>")?,
            truncated: compile(r"<IsTruncated>\s*true\s*</IsTruncated>")?,
            next_token: compile(r"(?s)<NextContinuationToken>(.*?)</NextContinuationToken>")?,
        })
    }

    fn parse(&self, xml: &str) -> Result<ListPage> {
        let mut objects = Vec::new();
        for entry in self.contents.captures_iter(xml) {
            let body = &entry[1];
            let key = self
                .key
                .captures(body)
                .map(|c| xml_unescape(&c[1]))
                .ok_or_else(|| Error::object_store("listing entry without <Key>"))?;
            let last_modified = self
                .last_modified
                .captures(body)
                .and_then(|c| DateTime::parse_from_rfc3339(&c[1]).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_default();
            let size = self
                .size
                .captures(body)
                .and_then(|c| c[1].parse().ok())
                .unwrap_or(0);
            objects.push(ObjectInfo {
                key,
                last_modified,
                size,
            });
        }

        let next_token = if self.truncated.is_match(xml) {
            self.next_token.captures(xml).map(|c| xml_unescape(&c[1]))
        } else {
            None
        };
        Ok(ListPage {
            objects,
            next_token,
        })
    }
}

// =============================================================================
// HTTP client
// =============================================================================

/// S3-compatible object store bound to one bucket
pub struct S3ObjectStore {
    client: Client,
    endpoint: Url,
    bucket: String,
    credentials: Credentials,
    timeout_secs: u64,
}

impl S3ObjectStore {
    pub fn new(
        endpoint: &str,
        region: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        timeout_secs: u64,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|e| Error::config(format!("Invalid S3 endpoint '{}': {}", endpoint, e)))?;
        if endpoint.host_str().is_none() {
            return Err(Error::config(format!("S3 endpoint '{}' has no host", endpoint)));
        }
        if bucket.trim().is_empty() {
            return Err(Error::config("BUCKET_NAME cannot be empty"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            bucket: bucket.to_string(),
            credentials: Credentials {
                access_key: access_key.to_string(),
                secret_key: secret_key.to_string(),
                region: region.to_string(),
            },
            timeout_secs,
        })
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    fn object_path(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.path().trim_end_matches('/'),
            uri_encode(&self.bucket, false),
            uri_encode(key, true)
        )
    }

    fn bucket_path(&self) -> String {
        format!(
            "{}/{}",
            self.endpoint.path().trim_end_matches('/'),
            uri_encode(&self.bucket, false)
        )
    }

    fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<Response> {
        let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = sha256_hex(&body);
        let headers = vec![
            ("host".to_string(), self.host_header()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        let canonical = CanonicalRequest {
            method: method.as_str(),
            path,
            query,
            headers: &headers,
            payload_hash: &payload_hash,
        };
        let authorization = authorization_header(&self.credentials, &canonical, &amz_date)?;

        let mut url = format!(
            "{}://{}{}",
            self.endpoint.scheme(),
            self.host_header(),
            path
        );
        let query_string = canonical.canonical_query();
        if !query_string.is_empty() {
            url.push('?');
            url.push_str(&query_string);
        }

        let mut request = self
            .client
            .request(method, &url)
            .header("x-amz-content-sha256", payload_hash)
            .header("x-amz-date", amz_date)
            .header("Authorization", authorization);
        if let Some(content_type) = content_type {
            request = request.header("Content-Type", content_type);
        }

        request.body(body).send().map_err(|e| {
            if e.is_timeout() {
                Error::object_store(format!("timed out after {} seconds", self.timeout_secs))
            } else {
                Error::object_store(format!("request failed: {}", e))
            }
        })
    }

    fn status_error(response: Response, what: &str) -> Error {
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        let code = Regex::new(r"<Code>(.*?)</Code>")
            .ok()
            .and_then(|re| re.captures(&body).map(|c| c[1].to_string()));
        match code {
            Some(code) => Error::object_store(format!("{}: HTTP {} {}", what, status, code)),
            None => Error::object_store(format!("{}: HTTP {}", what, status)),
        }
    }
}

impl ObjectStore for S3ObjectStore {
    fn location(&self) -> String {
        format!("s3://{}/", self.bucket)
    }

    fn put(&self, key: &str, body: &[u8], content_type: &str) -> Result<()> {
        let response = self.execute(
            Method::PUT,
            &self.object_path(key),
            &[],
            body.to_vec(),
            Some(content_type),
        )?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response, &format!("PUT {}", key)))
        }
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = self.execute(Method::GET, &self.object_path(key), &[], Vec::new(), None)?;
        match response.status().as_u16() {
            404 => Ok(None),
            status if (200..300).contains(&status) => response
                .bytes()
                .map(|b| Some(b.to_vec()))
                .map_err(|e| Error::object_store(format!("GET {}: {}", key, e))),
            _ => Err(Self::status_error(response, &format!("GET {}", key))),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let parser = ListParser::new()?;
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut query = vec![("list-type".to_string(), "2".to_string())];
            if !prefix.is_empty() {
                query.push(("prefix".to_string(), prefix.to_string()));
            }
            if let Some(token) = &token {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let response =
                self.execute(Method::GET, &self.bucket_path(), &query, Vec::new(), None)?;
            if !response.status().is_success() {
                return Err(Self::status_error(response, "ListObjectsV2"));
            }
            let xml = response
                .text()
                .map_err(|e| Error::object_store(format!("ListObjectsV2: {}", e)))?;

            let page = parser.parse(&xml)?;
            objects.extend(page.objects);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(objects)
    }
}
