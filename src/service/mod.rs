//! Resumable upload protocol engine
//!
//! [`UploadService`] turns a parsed request into a session transition and an
//! [`UploadOutcome`]. It holds no session state of its own: records and bytes are
//! owned by the [`UploadStorage`] it drives, and same-session requests are
//! serialized through [`SessionLocks`].

pub mod events;
pub mod session_lock;
pub mod user_context;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info, warn};
use regex::Regex;
use tokio::sync::broadcast;

use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::range::ContentRange;
use crate::service::events::{EventPublisher, UploadEvent};
use crate::service::session_lock::SessionLocks;
use crate::service::user_context::UserContext;
use crate::session::{FileFilter, FileMetadata, FilePart, UploadFile};
use crate::storage::UploadStorage;

/// Transport-agnostic view of an upload request
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// Caller identity; `None` when unauthenticated
    pub user: Option<UserContext>,
    pub query: HashMap<String, String>,
    /// Declared mime type of the whole upload (`X-Upload-Content-Type`)
    pub upload_content_type: Option<String>,
    /// Declared total length, unparsed (`X-Upload-Content-Length`)
    pub upload_content_length: Option<String>,
    /// Length of this request's body (`Content-Length`)
    pub content_length: Option<u64>,
    pub content_range: Option<String>,
    /// Client metadata sent with a create
    pub metadata: FileMetadata,
    pub body: Bytes,
}

impl UploadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user = Some(UserContext::new(user_id.to_string()));
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_upload_intent(mut self, mime_type: &str, length: u64) -> Self {
        self.upload_content_type = Some(mime_type.to_string());
        self.upload_content_length = Some(length.to_string());
        self
    }

    pub fn with_content_range(mut self, range: &str) -> Self {
        self.content_range = Some(range.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: FileMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.content_length = Some(body.len() as u64);
        self.body = body;
        self
    }
}

/// Protocol-level result of an operation
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// Not an upload request; the transport should hand it on untouched
    PassThrough,
    /// Session created; carries the id for the locator
    Created(UploadFile),
    /// More bytes needed; the client resumes after `bytes_written`
    ResumeIncomplete { id: String, bytes_written: u64 },
    /// Upload finished and its bookkeeping removed
    Completed(UploadFile),
    Found(UploadFile),
    Listing(Vec<UploadFile>),
    Cancelled(UploadFile),
}

/// Compiled mime allow-list
#[derive(Debug, Clone)]
struct MimeFilter(Regex);

impl MimeFilter {
    fn new(patterns: &[String]) -> Result<Self, UploadError> {
        let joined = if patterns.is_empty() {
            // An empty list allows nothing.
            "$^".to_string()
        } else {
            patterns.join("|")
        };
        Regex::new(&joined)
            .map(MimeFilter)
            .map_err(|e| UploadError::InternalError(format!("invalid allow_mime pattern: {}", e)))
    }

    fn allows(&self, mime_type: &str) -> bool {
        self.0.is_match(mime_type)
    }
}

/// The protocol engine
pub struct UploadService {
    storage: Arc<dyn UploadStorage>,
    config: UploadConfig,
    mime: MimeFilter,
    locks: SessionLocks,
    events: EventPublisher,
}

impl UploadService {
    pub fn new(storage: Arc<dyn UploadStorage>, config: UploadConfig) -> Result<Self, UploadError> {
        Self::with_events(storage, config, EventPublisher::default())
    }

    pub fn with_events(
        storage: Arc<dyn UploadStorage>,
        config: UploadConfig,
        events: EventPublisher,
    ) -> Result<Self, UploadError> {
        let mime = MimeFilter::new(&config.allow_mime)?;
        Ok(Self {
            storage,
            config,
            mime,
            locks: SessionLocks::new(),
            events,
        })
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    /// Route a request by verb; unknown verbs pass through
    pub async fn dispatch(&self, method: &str, req: UploadRequest) -> Result<UploadOutcome, UploadError> {
        debug!(
            "{} query: {:?} range: {:?} length: {:?}",
            method, req.query, req.content_range, req.content_length
        );
        match method.to_ascii_uppercase().as_str() {
            "POST" => self.create(req).await,
            "PUT" => self.write(req).await,
            "GET" => self.find(req).await,
            "DELETE" => self.cancel(req).await,
            _ => Ok(UploadOutcome::PassThrough),
        }
    }

    fn locator<'a>(&self, req: &'a UploadRequest) -> Option<&'a str> {
        req.query
            .get(&self.config.locator_param)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Run a storage call off the async executor
    async fn blocking<T, F>(&self, f: F) -> Result<T, UploadError>
    where
        F: FnOnce(&dyn UploadStorage) -> Result<T, UploadError> + Send + 'static,
        T: Send + 'static,
    {
        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || f(storage.as_ref())).await?
    }

    /// Open a new session (POST)
    pub async fn create(&self, req: UploadRequest) -> Result<UploadOutcome, UploadError> {
        let user = req.user.ok_or(UploadError::Unauthenticated)?;
        let mime_type = match req.upload_content_type.as_deref().map(str::trim) {
            Some(mime) if !mime.is_empty() => mime.to_string(),
            _ => return Ok(UploadOutcome::PassThrough),
        };
        let size = req
            .upload_content_length
            .as_deref()
            .ok_or_else(|| UploadError::InvalidRequest("missing upload content length".to_string()))?
            .trim()
            .parse::<u64>()
            .map_err(|_| UploadError::InvalidRequest("invalid upload content length".to_string()))?;

        if size > self.config.max_upload_size {
            warn!("Rejecting upload of {} bytes for {}", size, user.user_id);
            return Err(UploadError::SizeExceeded { size, max: self.config.max_upload_size });
        }
        if !self.mime.allows(&mime_type) {
            warn!("Rejecting upload of type {} for {}", mime_type, user.user_id);
            return Err(UploadError::MimeNotAllowed(mime_type));
        }

        let mut file = UploadFile::new(req.metadata);
        file.mime_type = mime_type;
        file.size = size;
        file.user_id = Some(user.user_id.clone());

        let file = self.blocking(move |storage| storage.create(&user, file)).await?;
        info!("Upload session {} opened for {}", file.id, file.user_id.as_deref().unwrap_or("-"));
        self.events.publish(UploadEvent::Created(file.clone()));
        Ok(UploadOutcome::Created(file))
    }

    /// Store a chunk or answer a progress query (PUT)
    pub async fn write(&self, req: UploadRequest) -> Result<UploadOutcome, UploadError> {
        let id = self.locator(&req).ok_or(UploadError::FileNotFound)?.to_string();
        log_mdc::insert("upload_id", &id);

        let range = req
            .content_range
            .as_deref()
            .map(str::parse::<ContentRange>)
            .transpose()?;

        let _guard = self.locks.acquire(&id).await;
        let lookup = id.clone();
        let file = self
            .blocking(move |storage| storage.find_by_id(&lookup))
            .await?
            .ok_or(UploadError::FileNotFound)?;

        let chunk_len = req.content_length.unwrap_or(req.body.len() as u64);
        if chunk_len > self.config.max_chunk_size {
            warn!("Chunk of {} bytes for upload {} exceeds limit", chunk_len, id);
            return Err(UploadError::PayloadTooLarge { size: chunk_len, max: self.config.max_chunk_size });
        }

        // Queries and chunks must both describe the declared upload.
        if let Some(total) = range.as_ref().map(ContentRange::total) {
            if total != file.size {
                return Err(UploadError::InvalidRequest(format!(
                    "range total {} does not match declared size {}",
                    total, file.size
                )));
            }
        }

        let body_len = req.body.len() as u64;
        let (start, total) = match range {
            Some(ContentRange::Query { total }) => {
                let query_id = id.clone();
                let current = self
                    .blocking(move |storage| storage.write(&FilePart::query(&query_id), &[]))
                    .await?;
                if current.bytes_written == total {
                    return self.complete(&id, current.bytes_written).await;
                }
                debug!("Upload {} has {} of {} bytes", id, current.bytes_written, total);
                return Ok(UploadOutcome::ResumeIncomplete { id, bytes_written: current.bytes_written });
            }
            Some(ContentRange::Chunk { start, total, .. }) => (start, total),
            None => (0, file.size),
        };
        if start + body_len > total {
            return Err(UploadError::InvalidRequest(format!(
                "{} bytes at offset {} overflow declared size {}",
                body_len, start, total
            )));
        }

        let part = FilePart {
            id: id.clone(),
            start: Some(start),
            end: (body_len > 0).then(|| start + body_len - 1),
            total: Some(total),
            user_id: file.user_id.clone(),
        };
        let body = req.body;
        let written = self.blocking(move |storage| storage.write(&part, &body)).await?;

        if written.bytes_written >= total {
            return self.complete(&id, written.bytes_written).await;
        }
        let bytes_written = written.bytes_written;
        self.events.publish(UploadEvent::Part(written));
        Ok(UploadOutcome::ResumeIncomplete { id, bytes_written })
    }

    /// Drop the bookkeeping of a finished upload; its container stays
    async fn complete(&self, id: &str, bytes_written: u64) -> Result<UploadOutcome, UploadError> {
        let finalize_id = id.to_string();
        let mut file = self
            .blocking(move |storage| storage.finalize(&finalize_id))
            .await?
            .ok_or(UploadError::FileNotFound)?;
        file.bytes_written = bytes_written;
        info!("Upload {} completed with {} bytes", id, bytes_written);
        self.events.publish(UploadEvent::Completed(file.clone()));
        Ok(UploadOutcome::Completed(file))
    }

    /// Look up one session or list the caller's sessions (GET)
    pub async fn find(&self, req: UploadRequest) -> Result<UploadOutcome, UploadError> {
        let user = req.user.as_ref().ok_or(UploadError::Unauthenticated)?;
        let mut filter = FileFilter::owned_by(&user.user_id);

        match self.locator(&req) {
            Some(id) => {
                filter = filter.with_id(id);
                let file = self
                    .blocking(move |storage| storage.find(&filter))
                    .await?
                    .into_iter()
                    .next()
                    .ok_or(UploadError::FileNotFound)?;
                Ok(UploadOutcome::Found(file))
            }
            None => {
                let files = self.blocking(move |storage| storage.find(&filter)).await?;
                Ok(UploadOutcome::Listing(files))
            }
        }
    }

    /// Abort a session and remove its bytes (DELETE)
    pub async fn cancel(&self, req: UploadRequest) -> Result<UploadOutcome, UploadError> {
        let user = req.user.as_ref().ok_or(UploadError::Unauthenticated)?;
        let id = self
            .locator(&req)
            .ok_or_else(|| UploadError::InvalidRequest("missing upload locator".to_string()))?
            .to_string();
        log_mdc::insert("upload_id", &id);

        let _guard = self.locks.acquire(&id).await;
        let filter = FileFilter::owned_by(&user.user_id).with_id(&id);
        let owned = self.blocking(move |storage| storage.find(&filter)).await?;
        if owned.is_empty() {
            return Err(UploadError::FileNotFound);
        }

        let delete_id = id.clone();
        let file = self
            .blocking(move |storage| storage.delete(&delete_id))
            .await?
            .ok_or(UploadError::FileNotFound)?;
        info!("Upload {} cancelled by {}", id, user.user_id);
        self.events.publish(UploadEvent::Deleted(file.clone()));
        Ok(UploadOutcome::Cancelled(file))
    }
}
