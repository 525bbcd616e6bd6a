//! Upload Storage Layer Abstraction
//!
//! Two layers live here. [`ByteStorage`] is the raw byte container backend: it
//! allocates containers, writes at offsets and reports the real persisted size.
//! [`UploadStorage`] is the facade the protocol engine talks to; it pairs a byte
//! backend with a [`MetadataStorage`](crate::metadata::MetadataStorage) and owns
//! both the session record and the container of every upload.

pub mod local_store;
pub mod mock_store;
pub mod session_store;
pub mod config;


use std::fmt;
use std::io;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;

use crate::error::UploadError;
use crate::service::user_context::UserContext;
use crate::session::{FileFilter, FilePart, UploadFile};

/// Trait defining the byte container interface
pub trait ByteStorage: Send + Sync {
    /// Make sure a container exists at `path` without truncating it; returns its size
    fn ensure(&self, path: &Path) -> io::Result<u64>;

    /// Write `data` at offset `start`, keeping bytes beyond the write; returns the new size
    fn write_at(&self, path: &Path, start: u64, data: &[u8]) -> io::Result<u64>;

    /// Remove the container; a missing container is not an error
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Trait defining the storage facade consumed by the protocol engine
pub trait UploadStorage: Send + Sync {
    /// Assign the id and container of a new (or re-declared) session and persist it
    fn create(&self, ctx: &UserContext, file: UploadFile) -> Result<UploadFile, UploadError>;

    /// Write a chunk, or re-check the container size for a query-only part
    fn write(&self, part: &FilePart, data: &[u8]) -> Result<UploadFile, UploadError>;

    /// Remove container and record; `None` when the id is unknown
    fn delete(&self, id: &str) -> Result<Option<UploadFile>, UploadError>;

    /// Remove the record of a completed session, keeping its container
    fn finalize(&self, id: &str) -> Result<Option<UploadFile>, UploadError>;

    /// Enumerate session records matching the filter
    fn find(&self, filter: &FileFilter) -> Result<Vec<UploadFile>, UploadError>;

    fn find_by_id(&self, id: &str) -> Result<Option<UploadFile>, UploadError>;
}

/// Resolver signature for computed destinations
pub type DestinationFn = dyn Fn(&UserContext, &UploadFile) -> Option<PathBuf> + Send + Sync;

/// Where byte containers are placed
#[derive(Clone)]
pub enum Destination {
    /// Containers are named by session id inside this directory
    Directory(PathBuf),
    /// Path computed from the request and the session. A result ending with a
    /// path separator is a directory and gets the session id appended.
    Resolver(Arc<DestinationFn>),
}

impl Destination {
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Destination::Directory(path.into())
    }

    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn(&UserContext, &UploadFile) -> Option<PathBuf> + Send + Sync + 'static,
    {
        Destination::Resolver(Arc::new(f))
    }

    /// Container path for a session whose id has been derived
    pub fn resolve(&self, ctx: &UserContext, file: &UploadFile) -> Result<PathBuf, UploadError> {
        match self {
            Destination::Directory(dir) => Ok(dir.join(&file.id)),
            Destination::Resolver(resolve) => {
                let path = resolve(ctx, file).ok_or_else(|| {
                    UploadError::InternalError(format!("no destination resolved for {}", file.id))
                })?;
                let raw = path.to_string_lossy();
                if raw.ends_with('/') || raw.ends_with(MAIN_SEPARATOR) {
                    Ok(path.join(&file.id))
                } else {
                    Ok(path)
                }
            }
        }
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Directory(dir) => f.debug_tuple("Directory").field(dir).finish(),
            Destination::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FileMetadata;

    fn file_with_id(id: &str) -> UploadFile {
        let mut file = UploadFile::new(FileMetadata::new());
        file.id = id.to_string();
        file
    }

    #[test]
    fn test_directory_destination_appends_id() {
        let dest = Destination::directory("/var/uploads");
        let path = dest.resolve(&UserContext::new("alice".into()), &file_with_id("abc")).unwrap();
        assert_eq!(path, PathBuf::from("/var/uploads/abc"));
    }

    #[test]
    fn test_resolver_destination() {
        let dest = Destination::resolver(|ctx, file| {
            Some(PathBuf::from(format!("/data/{}/{}.bin", ctx.user_id, file.filename)))
        });
        let mut file = file_with_id("abc");
        file.filename = "movie".to_string();
        let path = dest.resolve(&UserContext::new("alice".into()), &file).unwrap();
        assert_eq!(path, PathBuf::from("/data/alice/movie.bin"));
    }

    #[test]
    fn test_resolver_directory_result_gets_id() {
        let dest = Destination::resolver(|ctx, _| Some(PathBuf::from(format!("/data/{}/", ctx.user_id))));
        let path = dest.resolve(&UserContext::new("bob".into()), &file_with_id("xyz")).unwrap();
        assert_eq!(path, PathBuf::from("/data/bob/xyz"));
    }

    #[test]
    fn test_unresolved_destination_is_internal_error() {
        let dest = Destination::resolver(|_, _| None);
        let result = dest.resolve(&UserContext::new("bob".into()), &file_with_id("xyz"));
        assert!(matches!(result, Err(UploadError::InternalError(_))));
    }
}
