//! Metadata Storage Layer Abstraction
//! 
//! Session records live in a durable key-value store keyed by upload id. Every
//! store is scoped to a version tag so records written by a different schema
//! generation are never read back as current sessions.

pub mod sqlite_store;
pub mod mock_store;
pub mod config;


use crate::error::UploadError;
use crate::session::UploadFile;

/// Version tag of the record format written by this build
pub fn metadata_version() -> String {
    format!("{}@{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Trait defining the metadata storage interface
///
/// A mutation is visible to the next lookup as soon as the call returns.
pub trait MetadataStorage: Send + Sync {
    /// Version tag the records of this store are written under
    fn version(&self) -> &str;

    /// Fetch the record for a session id
    fn get(&self, id: &str) -> Result<Option<UploadFile>, UploadError>;

    /// Insert or replace the record keyed by `file.id`
    fn set(&self, file: &UploadFile) -> Result<(), UploadError>;

    /// Remove a record, returning whether one existed
    fn delete(&self, id: &str) -> Result<bool, UploadError>;

    /// Every record of this version, oldest first
    fn all(&self) -> Result<Vec<UploadFile>, UploadError>;
}
