//! Upload session model
//!
//! An [`UploadFile`] describes one upload attempt from creation until it is finalized
//! or cancelled. Its id is derived from client-declared attributes so that a retried
//! create lands on the same session.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mime type assumed when the client declares none
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Opaque client-supplied metadata, e.g. original form field names
pub type FileMetadata = Map<String, Value>;

/// Lifecycle state of an upload session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Created,
    Part,
    Completed,
    Deleted,
}

impl UploadStatus {
    /// Whether the session still accepts bytes
    pub fn is_open(&self) -> bool {
        matches!(self, UploadStatus::Created | UploadStatus::Part)
    }
}

/// An upload session and its durable record shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadFile {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    /// Declared total length in bytes
    pub size: u64,
    /// Bytes actually persisted in the container
    pub bytes_written: u64,
    /// Location of the byte container; empty until the storage resolves it
    pub path: String,
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub metadata: FileMetadata,
    pub status: UploadStatus,
    /// Creation time, milliseconds since the epoch
    pub timestamp: i64,
}

/// Reads the first present alias as text; numbers are rendered without quotes
fn first_text(metadata: &FileMetadata, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match metadata.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn first_size(metadata: &FileMetadata, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| match metadata.get(*key) {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    })
}

impl UploadFile {
    /// Build a session from client metadata, normalizing aliased field names
    pub fn new(metadata: FileMetadata) -> Self {
        let filename = first_text(&metadata, &["name", "title", "filename"])
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let mime_type = first_text(&metadata, &["mimeType", "type", "filetype"])
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
        let size = first_size(&metadata, &["size", "byteCount"]).unwrap_or(0);
        let last_modified = first_text(&metadata, &["lastModified"]);

        Self {
            id: String::new(),
            filename,
            mime_type,
            size,
            bytes_written: 0,
            path: String::new(),
            user_id: None,
            last_modified,
            metadata,
            status: UploadStatus::Created,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Compute the identity hash from filename, size, lastModified (or creation
    /// time) and owner. Calling it again on an unchanged session yields the same id.
    pub fn derive_id(&mut self) -> &str {
        let modified = self
            .last_modified
            .clone()
            .unwrap_or_else(|| self.timestamp.to_string());
        let ordered = format!(
            "{}-{}-{}-{}",
            self.filename,
            self.size,
            modified,
            self.user_id.as_deref().unwrap_or("")
        );
        // The joined string is hashed in its JSON-quoted form.
        let quoted = Value::String(ordered).to_string();
        self.id = hex::encode(md5::compute(quoted.as_bytes()).0);
        &self.id
    }

    /// Snapshot of this session with a different status
    pub fn with_status(mut self, status: UploadStatus) -> Self {
        self.status = status;
        self
    }
}

/// Range descriptor handed to the storage for a write or a progress query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub id: String,
    /// Write offset; `None` asks for the current size without writing
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub total: Option<u64>,
    pub user_id: Option<String>,
}

impl FilePart {
    /// A progress query for `id`
    pub fn query(id: &str) -> Self {
        Self {
            id: id.to_string(),
            start: None,
            end: None,
            total: None,
            user_id: None,
        }
    }

    /// A write of bytes starting at `start`
    pub fn at(id: &str, start: u64) -> Self {
        Self {
            id: id.to_string(),
            start: Some(start),
            end: None,
            total: None,
            user_id: None,
        }
    }

    pub fn is_query(&self) -> bool {
        self.start.is_none()
    }
}

/// Filter for session enumeration; absent fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    pub user_id: Option<String>,
    pub id: Option<String>,
}

impl FileFilter {
    pub fn owned_by(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            id: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn matches(&self, file: &UploadFile) -> bool {
        let user_ok = match &self.user_id {
            Some(user) => file.user_id.as_deref() == Some(user.as_str()),
            None => true,
        };
        let id_ok = match &self.id {
            Some(id) => &file.id == id,
            None => true,
        };
        user_ok && id_ok
    }
}
