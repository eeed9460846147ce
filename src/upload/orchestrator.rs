//! Upload orchestrator
//!
//! Turns façade requests into correctly parameterized backend calls. Holds no
//! session state: the backend is the only authority on whether an upload is
//! still open.

use super::{
    is_valid_part_number, object_key, CompletedPart, MultipartBackend, MultipartSession,
    SignedUrlGrant, UploadError, UploadedPart,
};
use crate::config::UploadConfig;
use crate::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Message for an out of range part number
pub const PART_NUMBER_MESSAGE: &str = "Part number must be an integer between 1 and 10000";

/// Message for a malformed completion part list
pub const PARTS_MESSAGE: &str = "Parts must be an array of {ETag, PartNumber} objects";

/// Multipart upload orchestrator
///
/// Cheap to clone; clones share the backend handle.
#[derive(Clone)]
pub struct UploadOrchestrator {
    backend: Arc<dyn MultipartBackend>,
    url_expiry: Duration,
    max_list_pages: usize,
    max_listed_parts: usize,
}

impl UploadOrchestrator {
    /// Create an orchestrator over `backend`
    pub fn new(backend: Arc<dyn MultipartBackend>, config: &UploadConfig) -> Self {
        Self {
            backend,
            url_expiry: Duration::from_secs(config.url_expiry_seconds),
            max_list_pages: config.max_list_pages,
            max_listed_parts: config.max_listed_parts,
        }
    }

    /// Lifetime of every grant this orchestrator mints
    pub fn url_expiry(&self) -> Duration {
        self.url_expiry
    }

    /// Presign a single PUT for a small file under a fresh key
    #[tracing::instrument(
        name = "upload.sign_single",
        skip(self),
        fields(s3.key = tracing::field::Empty),
        err
    )]
    pub async fn sign_single_upload(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<SignedUrlGrant, UploadError> {
        let start = Instant::now();
        let result: Result<SignedUrlGrant, UploadError> = async {
            if filename.is_empty() || content_type.is_empty() {
                return Err(UploadError::Validation(
                    "Filename and contentType are required".into(),
                ));
            }

            let key = object_key(filename);
            tracing::Span::current().record("s3.key", key.as_str());

            let url = self
                .backend
                .presign_put_object(&key, content_type, self.url_expiry)
                .await?;

            Ok(SignedUrlGrant {
                url,
                method: "PUT",
                expires_in: self.url_expiry,
            })
        }
        .await;

        observe("sign_single", start, &result);
        result
    }

    /// Open a multipart upload under a fresh key
    ///
    /// The caller must keep the returned key; it is needed for every later call.
    #[tracing::instrument(
        name = "upload.initiate",
        skip(self, metadata),
        fields(s3.key = tracing::field::Empty, s3.upload_id = tracing::field::Empty),
        err
    )]
    pub async fn initiate_multipart_upload(
        &self,
        content_type: &str,
        metadata: HashMap<String, String>,
        filename: &str,
    ) -> Result<MultipartSession, UploadError> {
        let start = Instant::now();
        let result: Result<MultipartSession, UploadError> = async {
            if filename.is_empty() || content_type.is_empty() {
                return Err(UploadError::Validation(
                    "Filename and type are required".into(),
                ));
            }

            let key = object_key(filename);
            let span = tracing::Span::current();
            span.record("s3.key", key.as_str());

            let upload_id = self
                .backend
                .create_multipart_upload(&key, content_type, metadata)
                .await?;
            span.record("s3.upload_id", upload_id.as_str());

            tracing::info!(key = %key, upload_id = %upload_id, "Created multipart upload");

            Ok(MultipartSession { key, upload_id })
        }
        .await;

        observe("initiate", start, &result);
        result
    }

    /// Presign an UploadPart for one part of an open upload
    #[tracing::instrument(
        name = "upload.sign_part",
        skip(self),
        err
    )]
    pub async fn sign_part_upload(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
    ) -> Result<SignedUrlGrant, UploadError> {
        let start = Instant::now();
        let result: Result<SignedUrlGrant, UploadError> = async {
            require_session(key, upload_id)?;
            if !is_valid_part_number(part_number) {
                return Err(UploadError::Validation(PART_NUMBER_MESSAGE.into()));
            }

            let url = self
                .backend
                .presign_upload_part(key, upload_id, part_number, self.url_expiry)
                .await?;

            Ok(SignedUrlGrant {
                url,
                method: "PUT",
                expires_in: self.url_expiry,
            })
        }
        .await;

        observe("sign_part", start, &result);
        result
    }

    /// List every uploaded part, following the backend's pagination.
    ///
    /// Pages are fetched one after another because each request carries the
    /// previous page's marker. A failure on any page discards the parts
    /// gathered so far.
    #[tracing::instrument(
        name = "upload.list_parts",
        skip(self),
        fields(pages = tracing::field::Empty, parts_count = tracing::field::Empty),
        err
    )]
    pub async fn list_uploaded_parts(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>, UploadError> {
        let start = Instant::now();
        let result: Result<Vec<UploadedPart>, UploadError> = async {
            require_session(key, upload_id)?;

            let mut parts = Vec::new();
            let mut marker = None;
            let mut pages = 0usize;

            loop {
                if pages >= self.max_list_pages {
                    return Err(UploadError::ListingLimit {
                        what: "pages",
                        limit: self.max_list_pages,
                    });
                }

                let page = self
                    .backend
                    .list_parts_page(key, upload_id, marker.take())
                    .await?;
                pages += 1;

                parts.extend(page.parts);
                if parts.len() > self.max_listed_parts {
                    return Err(UploadError::ListingLimit {
                        what: "parts",
                        limit: self.max_listed_parts,
                    });
                }

                if !page.is_truncated {
                    break;
                }

                // A truncated page without a marker would restart the listing forever
                match page.next_marker {
                    Some(next) => marker = Some(next),
                    None => {
                        return Err(UploadError::backend(
                            "Backend reported a truncated part listing without a continuation marker",
                        ))
                    }
                }
            }

            let span = tracing::Span::current();
            span.record("pages", pages);
            span.record("parts_count", parts.len());
            metrics::record_list_pages(pages);

            Ok(parts)
        }
        .await;

        observe("list_parts", start, &result);
        result
    }

    /// Complete an upload with the parts the client declares.
    ///
    /// Parts are forwarded as given; the backend checks ETags and presence.
    #[tracing::instrument(
        name = "upload.complete",
        skip(self, parts),
        fields(parts_count = parts.len()),
        err
    )]
    pub async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<Option<String>, UploadError> {
        let start = Instant::now();
        let parts_count = parts.len();
        let result: Result<Option<String>, UploadError> = async {
            require_session(key, upload_id)?;
            let well_formed = parts
                .iter()
                .all(|p| is_valid_part_number(p.part_number) && !p.etag.is_empty());
            if parts.is_empty() || !well_formed {
                return Err(UploadError::Validation(PARTS_MESSAGE.into()));
            }

            let location = self
                .backend
                .complete_multipart_upload(key, upload_id, parts)
                .await?;

            tracing::info!(key = %key, upload_id = %upload_id, location = ?location, "Completed multipart upload");
            Ok(location)
        }
        .await;

        if result.is_ok() {
            metrics::record_completed_parts(parts_count);
        }
        observe("complete", start, &result);
        result
    }

    /// Abort an upload.
    ///
    /// Aborting a session that is already finished is reported as the
    /// backend's error, not as success.
    #[tracing::instrument(name = "upload.abort", skip(self), err)]
    pub async fn abort_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<(), UploadError> {
        let start = Instant::now();
        let result: Result<(), UploadError> = async {
            require_session(key, upload_id)?;
            self.backend.abort_multipart_upload(key, upload_id).await?;
            tracing::info!(key = %key, upload_id = %upload_id, "Aborted multipart upload");
            Ok(())
        }
        .await;

        observe("abort", start, &result);
        result
    }
}

fn require_session(key: &str, upload_id: &str) -> Result<(), UploadError> {
    if key.is_empty() {
        return Err(UploadError::Validation(
            "Key is required as a query parameter".into(),
        ));
    }
    if upload_id.is_empty() {
        return Err(UploadError::Validation("Upload id is required".into()));
    }
    Ok(())
}

fn observe<T>(operation: &str, start: Instant, result: &Result<T, UploadError>) {
    let elapsed = start.elapsed().as_secs_f64();
    match result {
        Ok(_) => metrics::record_operation(operation, "success", elapsed),
        Err(e) => {
            metrics::record_operation(operation, "failure", elapsed);
            metrics::record_error(e.kind());
        }
    }
}
