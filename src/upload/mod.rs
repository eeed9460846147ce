//! Upload module
//!
//! Domain types for brokering direct-to-bucket uploads, the backend seam the
//! orchestrator talks to, and the orchestrator itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub mod orchestrator;

pub use orchestrator::UploadOrchestrator;

/// Lowest part number accepted by S3
pub const MIN_PART_NUMBER: i32 = 1;

/// Highest part number accepted by S3
pub const MAX_PART_NUMBER: i32 = 10_000;

/// Upload errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    /// Malformed or missing input. Never reaches the backend.
    #[error("{0}")]
    Validation(String),

    /// The backend could not mint a presigned URL
    #[error("{0}")]
    Signing(String),

    /// The backend rejected a control-plane call
    #[error("{message}")]
    Backend {
        code: Option<String>,
        message: String,
        status: Option<u16>,
    },

    /// Part listing did not terminate within the configured ceilings
    #[error("Part listing exceeded {limit} {what}")]
    ListingLimit { what: &'static str, limit: usize },
}

impl UploadError {
    /// Build a backend error that carries only a message
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            code: None,
            message: message.into(),
            status: None,
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Signing(_) => "signing",
            Self::Backend { .. } => "backend",
            Self::ListingLimit { .. } => "listing_limit",
        }
    }
}

/// A presigned URL authorizing exactly one HTTP operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrlGrant {
    pub url: String,
    pub method: &'static str,
    pub expires_in: Duration,
}

/// An open multipart upload as returned by initiate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartSession {
    pub key: String,
    pub upload_id: String,
}

/// A part the client declares at completion time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: i32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

/// A part the backend reports as uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: i32,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "Size", skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(rename = "LastModified", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

/// One page of a part listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartsPage {
    pub parts: Vec<UploadedPart>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

/// Control-plane operations the orchestrator needs from object storage.
///
/// Implementations must be safe to share across concurrent requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MultipartBackend: Send + Sync {
    /// Presign a single PUT of `key` with the given content type
    async fn presign_put_object(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, UploadError>;

    /// Open a multipart upload and return its upload id
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String, UploadError>;

    /// Presign an UploadPart request
    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> Result<String, UploadError>;

    /// Fetch one page of uploaded parts, starting after `marker`
    async fn list_parts_page(
        &self,
        key: &str,
        upload_id: &str,
        marker: Option<String>,
    ) -> Result<PartsPage, UploadError>;

    /// Assemble the declared parts and return the object location
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<Option<String>, UploadError>;

    /// Discard the upload and any uncommitted part data
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), UploadError>;
}

/// Derive a fresh object key for `filename`.
///
/// The random prefix keeps two uploads of the same filename from colliding.
pub fn object_key(filename: &str) -> String {
    format!("{}-{}", uuid::Uuid::new_v4(), filename)
}

/// Check that `part_number` is within S3's part number range
pub fn is_valid_part_number(part_number: i32) -> bool {
    (MIN_PART_NUMBER..=MAX_PART_NUMBER).contains(&part_number)
}
