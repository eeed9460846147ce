//! Request handling for the upload façade
//!
//! Dispatches parsed routes to the orchestrator and renders JSON responses.
//! Every response, errors included, carries the CORS headers configured for
//! the service.

use crate::config::Config;
use crate::metrics;
use crate::router::{
    parse_part_number, require_key, CompleteMultipartRequest, CreateMultipartRequest,
    RequestParser, Route, RouterError, SignUploadRequest,
};
use crate::upload::{UploadError, UploadOrchestrator};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE, ORIGIN, VARY,
};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

const ALLOWED_METHODS: &str = "GET, POST, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

/// Errors surfaced to HTTP clients
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Router(RouterError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Router(RouterError::MethodNotAllowed(_)) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Router(RouterError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Upload(UploadError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Upload(UploadError::Signing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upload(UploadError::Backend { status, .. }) => status
                .filter(|s| (400..500).contains(s))
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Upload(UploadError::ListingLimit { .. }) => StatusCode::BAD_GATEWAY,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// State shared by every connection
pub struct AppState {
    orchestrator: UploadOrchestrator,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(orchestrator: UploadOrchestrator, config: Arc<Config>) -> Self {
        Self {
            orchestrator,
            config,
        }
    }
}

/// Handle one HTTP request
///
/// # Supported Endpoints
///
/// * `GET /health` - Health check (returns "ok")
/// * `GET /metrics` - Prometheus metrics, when enabled
/// * `OPTIONS *` - CORS preflight
/// * `POST {prefix}/s3/sign` - Presign a single PUT
/// * `POST {prefix}/s3/multipart` - Initiate a multipart upload
/// * `GET {prefix}/s3/multipart/{uploadId}/{partNumber}?key=K` - Presign one part
/// * `GET {prefix}/s3/multipart/{uploadId}?key=K` - List uploaded parts
/// * `POST {prefix}/s3/multipart/{uploadId}/complete?key=K` - Complete
/// * `DELETE {prefix}/s3/multipart/{uploadId}?key=K` - Abort
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<String>, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let origin = req
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    info!("Handling {} {}", method, path);

    let result = match RequestParser::parse(&method, &path, &state.config.server.path_prefix) {
        Ok(route) => dispatch(route, req, &state).await,
        Err(e) => Err(HandlerError::from(e)),
    };

    let mut response = match result {
        Ok(response) => response,
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                error!(status = status.as_u16(), error = %e, "{} {} failed", method, path);
            } else {
                warn!(status = status.as_u16(), error = %e, "{} {} rejected", method, path);
            }
            error_response(&e)
        }
    };

    apply_cors(&mut response, &state.config, origin.as_deref());
    metrics::record_http_request(&method, response.status().as_u16());
    Ok(response)
}

async fn dispatch<B>(
    route: Route,
    req: Request<B>,
    state: &AppState,
) -> Result<Response<String>, HandlerError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let query = RequestParser::parse_query(req.uri().query());
    let orchestrator = &state.orchestrator;

    match route {
        Route::Health => Ok(text_response(StatusCode::OK, "text/plain", "ok".into())),
        Route::Metrics => metrics_response(state.config.metrics.enabled),
        Route::Preflight => Ok(text_response(StatusCode::NO_CONTENT, "text/plain", String::new())),
        Route::SignUpload => {
            let body: SignUploadRequest = read_json(req, state.config.server.max_body_bytes).await?;
            let (filename, content_type) = body.validate()?;
            let grant = orchestrator
                .sign_single_upload(&filename, &content_type)
                .await?;
            Ok(json_response(
                StatusCode::OK,
                &json!({ "url": grant.url, "method": grant.method }),
            ))
        }
        Route::CreateMultipartUpload => {
            let body: CreateMultipartRequest =
                read_json(req, state.config.server.max_body_bytes).await?;
            let (content_type, metadata, filename) = body.validate()?;
            let session = orchestrator
                .initiate_multipart_upload(&content_type, metadata, &filename)
                .await?;
            Ok(json_response(
                StatusCode::OK,
                &json!({ "key": session.key, "uploadId": session.upload_id }),
            ))
        }
        Route::SignPart {
            upload_id,
            part_number,
        } => {
            let key = require_key(&query)?;
            let part_number = parse_part_number(&part_number)?;
            let grant = orchestrator
                .sign_part_upload(&key, &upload_id, part_number)
                .await?;
            Ok(json_response(
                StatusCode::OK,
                &json!({ "url": grant.url, "expires": grant.expires_in.as_secs() }),
            ))
        }
        Route::ListParts { upload_id } => {
            let key = require_key(&query)?;
            let parts = orchestrator.list_uploaded_parts(&key, &upload_id).await?;
            Ok(json_response(StatusCode::OK, &parts))
        }
        Route::CompleteMultipartUpload { upload_id } => {
            let key = require_key(&query)?;
            let body: CompleteMultipartRequest =
                read_json(req, state.config.server.max_body_bytes).await?;
            let parts = body.validate()?;
            let location = orchestrator
                .complete_multipart_upload(&key, &upload_id, parts)
                .await?;
            let body = match location {
                Some(location) => json!({ "location": location }),
                None => json!({}),
            };
            Ok(json_response(StatusCode::OK, &body))
        }
        Route::AbortMultipartUpload { upload_id } => {
            let key = require_key(&query)?;
            orchestrator.abort_multipart_upload(&key, &upload_id).await?;
            Ok(json_response(StatusCode::OK, &json!({})))
        }
    }
}

/// Collect a bounded body and decode it as JSON. An empty body decodes as `{}`.
async fn read_json<B, T>(req: Request<B>, limit: usize) -> Result<T, HandlerError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    T: DeserializeOwned,
{
    let bytes = Limited::new(req.into_body(), limit)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                HandlerError::PayloadTooLarge(limit)
            } else {
                HandlerError::InvalidBody(e.to_string())
            }
        })?
        .to_bytes();

    let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        &bytes
    };

    serde_json::from_slice(bytes).map_err(|e| HandlerError::InvalidBody(e.to_string()))
}

fn metrics_response(enabled: bool) -> Result<Response<String>, HandlerError> {
    if !enabled {
        return Err(RouterError::NotFound {
            method: "GET".into(),
            path: "/metrics".into(),
        }
        .into());
    }
    let text = metrics::gather_text().map_err(|e| HandlerError::Internal(e.to_string()))?;
    Ok(text_response(
        StatusCode::OK,
        "text/plain; version=0.0.4",
        text,
    ))
}

fn text_response(status: StatusCode, content_type: &'static str, body: String) -> Response<String> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<String> {
    match serde_json::to_string(body) {
        Ok(body) => text_response(status, "application/json", body),
        Err(e) => error_response(&HandlerError::Internal(e.to_string())),
    }
}

fn error_response(err: &HandlerError) -> Response<String> {
    let status = err.status();
    let body = json!({ "statusCode": status.as_u16(), "message": err.to_string() });
    text_response(status, "application/json", body.to_string())
}

fn apply_cors(response: &mut Response<String>, config: &Config, origin: Option<&str>) {
    let cors = &config.server.cors;
    let allow_origin = if cors.allows_any() {
        Some(HeaderValue::from_static("*"))
    } else {
        origin
            .filter(|o| cors.allows(o))
            .and_then(|o| HeaderValue::from_str(o).ok())
    };

    let Some(allow_origin) = allow_origin else {
        return;
    };

    let headers = response.headers_mut();
    if !cors.allows_any() {
        headers.insert(VARY, HeaderValue::from_static("Origin"));
    }
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
}
