//! Read-only access to the `sensordata` table.
//!
//! - `ReadingSource` is the seam every view fetches through: one round trip per call,
//!   no retry and no caching. Callers decide what to do with a failure.
//! - `SupabaseClient` is a blocking `ureq` client for the Supabase REST (PostgREST)
//!   endpoint. The direct-Postgres reader lives in `crate::db::source`.
//!
//! Results keep "the store has no rows" (`Ok(vec![])`) apart from "the store could
//! not be read" (`Err(FetchError)`).

use crate::models::reading::{normalize_batch, ReadingRecord};
use core::fmt;
use http::StatusCode;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;
use std::time::Duration;

pub const READINGS_TABLE: &str = "sensordata";

/// A row (or the whole payload when `row` is `None`) did not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMismatch {
    pub row: Option<usize>,
    pub path: String,
    pub message: String,
}

impl Display for SchemaMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(row) => write!(f, "row {} at {}: {}", row, self.path, self.message),
            None => write!(f, "payload: {}", self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The round trip did not complete (DNS, connect, timeout, broken connection).
    Connectivity(String),
    /// The store answered with a non-success status.
    Rejected { status: u16, message: String },
    Schema(SchemaMismatch),
}

impl FetchError {
    /// Rejections that no later cycle can fix: bad credentials or a wrong endpoint.
    pub fn is_configuration(&self) -> bool {
        matches!(self, FetchError::Rejected { status: 401 | 403 | 404, .. })
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Connectivity(s) => write!(f, "connectivity failure: {}", s),
            FetchError::Rejected { status, message } => write!(f, "http {}: {}", status, message),
            FetchError::Schema(m) => write!(f, "schema mismatch: {}", m),
        }
    }
}

impl Error for FetchError {}

impl From<SchemaMismatch> for FetchError {
    fn from(value: SchemaMismatch) -> Self {
        FetchError::Schema(value)
    }
}

pub trait ReadingSource: Send {
    /// Short human-readable description for logs.
    fn describe(&self) -> String;

    /// Up to `limit` most recent readings, newest first.
    fn fetch_latest(&mut self, limit: NonZeroU32) -> Result<Vec<ReadingRecord>, FetchError>;

    /// Single-row fetch used at startup to validate credentials and endpoint.
    fn probe(&mut self) -> Result<(), FetchError> {
        self.fetch_latest(NonZeroU32::MIN).map(|_| ())
    }
}

impl<S: ReadingSource + ?Sized> ReadingSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn fetch_latest(&mut self, limit: NonZeroU32) -> Result<Vec<ReadingRecord>, FetchError> {
        (**self).fetch_latest(limit)
    }

    fn probe(&mut self) -> Result<(), FetchError> {
        (**self).probe()
    }
}

/// Errors raised while constructing a client; these are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    InvalidUrl(String),
    MissingKey,
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::InvalidUrl(s) => write!(f, "invalid store url: {}", s),
            ClientError::MissingKey => write!(f, "missing api key for the store"),
        }
    }
}

impl Error for ClientError {}

pub struct SupabaseClient {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = base_url.trim().trim_end_matches('/');
        let uri: http::Uri = base_url
            .parse()
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(uri.scheme_str(), Some("http" | "https")) {
            return Err(ClientError::InvalidUrl(format!("{}: scheme must be http or https", base_url)));
        }
        if uri.host().is_none_or(str::is_empty) {
            return Err(ClientError::InvalidUrl(format!("{}: missing host", base_url)));
        }
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ClientError::MissingKey);
        }

        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();

        Ok(SupabaseClient {
            agent: ureq::Agent::new_with_config(config),
            endpoint: format!("{}/rest/v1/{}", base_url, READINGS_TABLE),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ReadingSource for SupabaseClient {
    fn describe(&self) -> String {
        format!("supabase rest ({})", self.endpoint)
    }

    fn fetch_latest(&mut self, limit: NonZeroU32) -> Result<Vec<ReadingRecord>, FetchError> {
        let mut response = self
            .agent
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .header("apikey", self.api_key.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .query("select", "*")
            .query("order", "id.desc")
            .query("limit", limit.to_string())
            .call()
            .map_err(|e| FetchError::Connectivity(e.to_string()))?;

        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| FetchError::Connectivity(format!("reading response body failed: {}", e)))?;

        if !status.is_success() {
            return Err(FetchError::Rejected {
                status: status.as_u16(),
                message: rejection_message(status, &body),
            });
        }

        let rows = parse_rows(&body)?;
        Ok(normalize_batch(rows, limit.get() as usize))
    }
}

fn rejection_message(status: StatusCode, body: &str) -> String {
    // PostgREST error bodies carry a `message` field
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().chars().take(200).collect());
    match (status.canonical_reason(), detail.is_empty()) {
        (Some(reason), true) => reason.to_string(),
        (Some(reason), false) => format!("{}: {}", reason, detail),
        (None, true) => String::from("<no body>"),
        (None, false) => detail,
    }
}

/// Decode a JSON array of rows; the first row that does not fit fails the batch.
pub fn parse_rows(body: &str) -> Result<Vec<ReadingRecord>, SchemaMismatch> {
    let values: Vec<serde_json::Value> = serde_json::from_str(body).map_err(|e| SchemaMismatch {
        row: None,
        path: ".".to_string(),
        message: e.to_string(),
    })?;

    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            serde_path_to_error::deserialize::<_, ReadingRecord>(value).map_err(|e| SchemaMismatch {
                row: Some(index),
                path: e.path().to_string(),
                message: e.inner().to_string(),
            })
        })
        .collect()
}
