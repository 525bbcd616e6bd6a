//! Storage facade pairing session records with byte containers

use crate::error::UploadError;
use crate::metadata::MetadataStorage;
use crate::service::user_context::UserContext;
use crate::session::{FileFilter, FilePart, UploadFile, UploadStatus};
use crate::storage::local_store::LocalDiskStore;
use crate::storage::{ByteStorage, Destination, UploadStorage};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// [`UploadStorage`] over an injected metadata store and byte backend
pub struct SessionStorage {
    metadata: Arc<dyn MetadataStorage>,
    bytes: Arc<dyn ByteStorage>,
    destination: Destination,
    retain_completed: bool,
}

impl SessionStorage {
    pub fn new(
        metadata: Arc<dyn MetadataStorage>,
        bytes: Arc<dyn ByteStorage>,
        destination: Destination,
    ) -> Self {
        Self {
            metadata,
            bytes,
            destination,
            retain_completed: true,
        }
    }

    /// Local disk storage: one file per session
    pub fn disk(metadata: Arc<dyn MetadataStorage>, destination: Destination) -> Self {
        Self::new(metadata, Arc::new(LocalDiskStore::new()), destination)
    }

    /// Whether finalize keeps the byte container (default) or removes it
    pub fn retain_completed(mut self, retain: bool) -> Self {
        self.retain_completed = retain;
        self
    }

    fn ensure(&self, path: &Path) -> Result<u64, UploadError> {
        self.bytes.ensure(path).map_err(|e| {
            error!("Failed to prepare container {}: {}", path.display(), e);
            UploadError::FileError(e)
        })
    }
}

impl UploadStorage for SessionStorage {
    fn create(&self, ctx: &UserContext, mut file: UploadFile) -> Result<UploadFile, UploadError> {
        file.derive_id();
        let path = self.destination.resolve(ctx, &file)?;
        file.path = path.to_string_lossy().into_owned();

        // An existing container means this session is being re-declared after a restart.
        file.bytes_written = self.ensure(&path)?;
        file.status = if file.bytes_written > 0 {
            UploadStatus::Part
        } else {
            UploadStatus::Created
        };

        self.metadata.set(&file)?;
        info!(
            "Created upload {} ({} bytes declared, {} present) at {}",
            file.id, file.size, file.bytes_written, file.path
        );
        Ok(file)
    }

    fn write(&self, part: &FilePart, data: &[u8]) -> Result<UploadFile, UploadError> {
        let mut file = self.metadata.get(&part.id)?.ok_or(UploadError::FileNotFound)?;
        if file.path.is_empty() {
            return Err(UploadError::FileNotFound);
        }
        let path = PathBuf::from(&file.path);

        // The container size wins over whatever the record claims.
        let actual = self.ensure(&path)?;
        if actual != file.bytes_written {
            warn!(
                "Upload {} record claims {} bytes but container holds {}",
                file.id, file.bytes_written, actual
            );
        }

        let start = match part.start {
            None => {
                file.bytes_written = actual;
                return Ok(file);
            }
            Some(start) => start,
        };

        // Never restart over existing bytes, and never leave a gap.
        if (start == 0 && actual > 0) || start > actual {
            debug!(
                "Upload {} refusing write at {}: container holds {} bytes",
                file.id, start, actual
            );
            if file.bytes_written != actual {
                file.bytes_written = actual;
                self.metadata.set(&file)?;
            }
            return Ok(file);
        }

        let size = self.bytes.write_at(&path, start, data).map_err(|e| {
            error!("Failed to write {} bytes to upload {}: {}", data.len(), file.id, e);
            UploadError::FileError(e)
        })?;

        file.bytes_written = size;
        file.status = UploadStatus::Part;
        self.metadata.set(&file)?;
        debug!("Upload {} now holds {}/{} bytes", file.id, file.bytes_written, file.size);
        Ok(file)
    }

    fn delete(&self, id: &str) -> Result<Option<UploadFile>, UploadError> {
        let Some(file) = self.metadata.get(id)? else {
            return Ok(None);
        };
        if !file.path.is_empty() {
            self.bytes.remove(Path::new(&file.path))?;
        }
        self.metadata.delete(id)?;
        info!("Deleted upload {}", id);
        Ok(Some(file.with_status(UploadStatus::Deleted)))
    }

    fn finalize(&self, id: &str) -> Result<Option<UploadFile>, UploadError> {
        let Some(file) = self.metadata.get(id)? else {
            return Ok(None);
        };
        self.metadata.delete(id)?;
        if !self.retain_completed && !file.path.is_empty() {
            self.bytes.remove(Path::new(&file.path))?;
        }
        info!("Finalized upload {} ({} bytes)", id, file.bytes_written);
        Ok(Some(file.with_status(UploadStatus::Completed)))
    }

    fn find(&self, filter: &FileFilter) -> Result<Vec<UploadFile>, UploadError> {
        if let Some(id) = &filter.id {
            return Ok(self
                .metadata
                .get(id)?
                .into_iter()
                .filter(|file| filter.matches(file))
                .collect());
        }
        Ok(self
            .metadata
            .all()?
            .into_iter()
            .filter(|file| filter.matches(file))
            .collect())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<UploadFile>, UploadError> {
        self.metadata.get(id)
    }
}
