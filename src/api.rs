//! actix-web binding of the upload protocol

use std::collections::HashMap;

use actix_web::http::header::{self, HeaderMap};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use bytes::BytesMut;
use futures::StreamExt;
use log::{debug, warn};
use serde_json::Value;

use crate::app_state::AppState;
use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::range::resume_range;
use crate::service::user_context::UserContext;
use crate::service::{UploadOutcome, UploadRequest};
use crate::session::FileMetadata;

pub const USER_HEADER: &str = "User";
pub const UPLOAD_CONTENT_TYPE: &str = "X-Upload-Content-Type";
pub const UPLOAD_CONTENT_LENGTH: &str = "X-Upload-Content-Length";

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn user_context(req: &HttpRequest) -> Option<UserContext> {
    let user = header_value(req.headers(), USER_HEADER)?;
    log_mdc::insert("user", &user);
    Some(UserContext::new(user))
}

/// MDC keys set while a request is handled
const MDC_KEYS: [&str; 2] = ["user", "upload_id"];

/// Common request fields; the body is filled in per verb
fn upload_request(req: &HttpRequest) -> UploadRequest {
    // Workers are reused across requests.
    for key in MDC_KEYS {
        log_mdc::remove(key);
    }
    let headers = req.headers();
    let query = web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .map(|query| query.into_inner())
        .unwrap_or_default();

    UploadRequest {
        user: user_context(req),
        query,
        upload_content_type: header_value(headers, UPLOAD_CONTENT_TYPE),
        upload_content_length: header_value(headers, UPLOAD_CONTENT_LENGTH),
        content_length: header_value(headers, header::CONTENT_LENGTH.as_str())
            .and_then(|value| value.parse().ok()),
        content_range: header_value(headers, header::CONTENT_RANGE.as_str()),
        ..UploadRequest::default()
    }
}

fn client_metadata(body: &[u8]) -> Result<FileMetadata, UploadError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(FileMetadata::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(UploadError::InvalidRequest("metadata must be a JSON object".to_string())),
        Err(e) => Err(UploadError::InvalidRequest(format!("invalid metadata: {}", e))),
    }
}

fn location(req: &HttpRequest, config: &UploadConfig, id: &str) -> String {
    let info = req.connection_info();
    format!(
        "{}://{}{}?{}={}",
        info.scheme(),
        info.host(),
        req.path(),
        config.locator_param,
        id
    )
}

fn render(req: &HttpRequest, config: &UploadConfig, outcome: UploadOutcome) -> HttpResponse {
    match outcome {
        UploadOutcome::PassThrough => HttpResponse::NotFound().body("Not Found"),
        UploadOutcome::Created(file) => HttpResponse::Created()
            .insert_header((header::LOCATION, location(req, config, &file.id)))
            .json(file),
        UploadOutcome::ResumeIncomplete { bytes_written, .. } => {
            let mut response = HttpResponse::build(StatusCode::PERMANENT_REDIRECT);
            if let Some(range) = resume_range(bytes_written) {
                response.insert_header((header::RANGE, range));
            }
            response.content_type("text/plain").body("Resume Incomplete")
        }
        UploadOutcome::Completed(file) | UploadOutcome::Found(file) => HttpResponse::Ok().json(file),
        UploadOutcome::Listing(files) => HttpResponse::Ok().json(files),
        UploadOutcome::Cancelled(_) => HttpResponse::NoContent().finish(),
    }
}

/// POST: open a session
pub async fn create(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, UploadError> {
    let mut request = upload_request(&req);
    request.metadata = client_metadata(&body)?;
    let outcome = state.service.create(request).await?;
    Ok(render(&req, state.service.config(), outcome))
}

/// PUT: store a chunk or report progress
pub async fn write(
    req: HttpRequest,
    mut payload: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, UploadError> {
    let mut request = upload_request(&req);
    let limit = state.service.config().max_chunk_size;

    // Stop buffering once the chunk is known to be too large; the engine rejects it.
    let mut bytes = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| UploadError::InvalidRequest(format!("payload error: {}", e)))?;
        bytes.extend_from_slice(&chunk);
        if bytes.len() as u64 > limit {
            warn!("Chunk body exceeds {} bytes, discarding the rest", limit);
            break;
        }
    }
    debug!("Received {} body bytes", bytes.len());

    let received = bytes.len() as u64;
    request.content_length = Some(request.content_length.map_or(received, |declared| declared.max(received)));
    request.body = bytes.freeze();

    let outcome = state.service.write(request).await?;
    Ok(render(&req, state.service.config(), outcome))
}

/// GET: one session or the caller's sessions
pub async fn find(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, UploadError> {
    let outcome = state.service.find(upload_request(&req)).await?;
    Ok(render(&req, state.service.config(), outcome))
}

/// DELETE: abort a session
pub async fn cancel(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, UploadError> {
    let outcome = state.service.cancel(upload_request(&req)).await?;
    Ok(render(&req, state.service.config(), outcome))
}

/// Mount the upload routes on `base_path`
pub fn configure(cfg: &mut web::ServiceConfig, base_path: &str) {
    cfg.service(
        web::resource(base_path)
            .route(web::post().to(create))
            .route(web::put().to(write))
            .route(web::get().to(find))
            .route(web::delete().to(cancel)),
    );
}
