//! Upload API Router
//!
//! Parses incoming requests into [`Route`]s and performs the shape validation
//! that happens before any orchestrator call: required keys, part number
//! range, and well-formed request bodies.

use crate::upload::orchestrator::{PARTS_MESSAGE, PART_NUMBER_MESSAGE};
use crate::upload::{is_valid_part_number, CompletedPart};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// Router errors
#[derive(Error, Debug, PartialEq)]
pub enum RouterError {
    #[error("Cannot {method} {path}")]
    NotFound { method: String, path: String },

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("{0}")]
    Validation(String),
}

/// Façade routes
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// GET /health
    Health,
    /// GET /metrics
    Metrics,
    /// OPTIONS on any route (CORS preflight)
    Preflight,
    /// POST {prefix}/s3/sign
    SignUpload,
    /// POST {prefix}/s3/multipart
    CreateMultipartUpload,
    /// GET {prefix}/s3/multipart/{uploadId}/{partNumber}?key=K
    SignPart {
        upload_id: String,
        part_number: String,
    },
    /// GET {prefix}/s3/multipart/{uploadId}?key=K
    ListParts { upload_id: String },
    /// POST {prefix}/s3/multipart/{uploadId}/complete?key=K
    CompleteMultipartUpload { upload_id: String },
    /// DELETE {prefix}/s3/multipart/{uploadId}?key=K
    AbortMultipartUpload { upload_id: String },
}

/// Upload API request parser
pub struct RequestParser;

impl RequestParser {
    /// Parse a method and path into a route. `prefix` is stripped first.
    pub fn parse(method: &str, path: &str, prefix: &str) -> Result<Route, RouterError> {
        let not_found = || RouterError::NotFound {
            method: method.to_string(),
            path: path.to_string(),
        };

        if method == "OPTIONS" {
            return Ok(Route::Preflight);
        }

        match (method, path) {
            ("GET", "/health") => return Ok(Route::Health),
            ("GET", "/metrics") => return Ok(Route::Metrics),
            _ => {}
        }

        let rest = path
            .strip_prefix(prefix)
            .filter(|rest| rest.starts_with('/'))
            .ok_or_else(not_found)?;
        let segments: Vec<&str> = rest
            .trim_end_matches('/')
            .split('/')
            .skip(1)
            .collect();

        let segments = match segments.split_first() {
            Some((&"s3", tail)) => tail,
            _ => return Err(not_found()),
        };

        match (method, segments) {
            ("POST", ["sign"]) => Ok(Route::SignUpload),
            ("POST", ["multipart"]) => Ok(Route::CreateMultipartUpload),
            ("GET", ["multipart", upload_id, part_number]) => Ok(Route::SignPart {
                upload_id: decode(upload_id),
                part_number: decode(part_number),
            }),
            ("GET", ["multipart", upload_id]) => Ok(Route::ListParts {
                upload_id: decode(upload_id),
            }),
            ("POST", ["multipart", upload_id, "complete"]) => {
                Ok(Route::CompleteMultipartUpload {
                    upload_id: decode(upload_id),
                })
            }
            ("DELETE", ["multipart", upload_id]) => Ok(Route::AbortMultipartUpload {
                upload_id: decode(upload_id),
            }),
            (_, ["sign"]) | (_, ["multipart", ..]) => Err(RouterError::MethodNotAllowed(format!(
                "Method {} not allowed on {}",
                method, path
            ))),
            _ => Err(not_found()),
        }
    }

    /// Parse a query string into decoded key/value pairs
    pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
        let mut params = HashMap::new();
        if let Some(q) = query {
            for pair in q.split('&').filter(|p| !p.is_empty()) {
                let mut kv = pair.splitn(2, '=');
                if let Some(key) = kv.next() {
                    let value = kv.next().unwrap_or("");
                    params.insert(decode_query(key), decode_query(value));
                }
            }
        }
        params
    }
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

fn decode_query(component: &str) -> String {
    decode(&component.replace('+', " "))
}

/// Extract the required `key` query parameter
pub fn require_key(query: &HashMap<String, String>) -> Result<String, RouterError> {
    query
        .get("key")
        .filter(|k| !k.is_empty())
        .cloned()
        .ok_or_else(|| RouterError::Validation("Key is required as a query parameter".into()))
}

/// Parse a part number path segment, which must be an integer in [1, 10000]
pub fn parse_part_number(raw: &str) -> Result<i32, RouterError> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .filter(|n| is_valid_part_number(*n))
        .ok_or_else(|| RouterError::Validation(PART_NUMBER_MESSAGE.into()))
}

/// Body of `POST /s3/sign`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUploadRequest {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl SignUploadRequest {
    /// Validate and return `(filename, content_type)`
    pub fn validate(self) -> Result<(String, String), RouterError> {
        match (non_empty(self.filename), non_empty(self.content_type)) {
            (Some(filename), Some(content_type)) => Ok((filename, content_type)),
            _ => Err(RouterError::Validation(
                "Filename and contentType are required".into(),
            )),
        }
    }
}

/// Body of `POST /s3/multipart`
#[derive(Debug, Deserialize)]
pub struct CreateMultipartRequest {
    #[serde(default, rename = "type")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl CreateMultipartRequest {
    /// Validate and return `(content_type, metadata, filename)`.
    ///
    /// Metadata values that are not strings are forwarded as their JSON text.
    pub fn validate(self) -> Result<(String, HashMap<String, String>, String), RouterError> {
        let (Some(content_type), Some(filename)) =
            (non_empty(self.content_type), non_empty(self.filename))
        else {
            return Err(RouterError::Validation(
                "Filename and type are required".into(),
            ));
        };

        let metadata = self
            .metadata
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect();

        Ok((content_type, metadata, filename))
    }
}

/// Body of `POST /s3/multipart/{uploadId}/complete`
#[derive(Debug, Deserialize)]
pub struct CompleteMultipartRequest {
    #[serde(default)]
    pub parts: Option<Vec<serde_json::Value>>,
}

impl CompleteMultipartRequest {
    /// Validate every declared part. One malformed entry rejects the call.
    pub fn validate(self) -> Result<Vec<CompletedPart>, RouterError> {
        let invalid = || RouterError::Validation(PARTS_MESSAGE.into());

        let parts = self.parts.filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        parts
            .iter()
            .map(|part| {
                let part_number = part
                    .get("PartNumber")
                    .and_then(part_number_value)
                    .filter(|n| is_valid_part_number(*n))
                    .ok_or_else(invalid)?;
                let etag = part
                    .get("ETag")
                    .and_then(serde_json::Value::as_str)
                    .filter(|e| !e.is_empty())
                    .ok_or_else(invalid)?;
                Ok(CompletedPart {
                    part_number,
                    etag: etag.to_string(),
                })
            })
            .collect()
    }
}

/// Accept a JSON number with no fractional part, or a string holding an integer
fn part_number_value(value: &serde_json::Value) -> Option<i32> {
    match value {
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(n) => i32::try_from(n).ok(),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i32::MIN as f64 && *f <= i32::MAX as f64)
                .map(|f| f as i32),
        },
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
