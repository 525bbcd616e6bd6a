//! Local disk byte container backend

use crate::storage::ByteStorage;
use log::{debug, info};
use std::fs::{self, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

/// Stores every upload as a plain file on the local filesystem
#[derive(Debug, Default, Clone)]
pub struct LocalDiskStore;

impl LocalDiskStore {
    pub fn new() -> Self {
        Self
    }

    fn create_parent(path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                info!("Creating upload directory {}", parent.display());
                fs::create_dir_all(parent)
            }
            _ => Ok(()),
        }
    }
}

impl ByteStorage for LocalDiskStore {
    fn ensure(&self, path: &Path) -> io::Result<u64> {
        Self::create_parent(path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let size = file.metadata()?.len();
        debug!("Container {} holds {} bytes", path.display(), size);
        Ok(size)
    }

    fn write_at(&self, path: &Path, start: u64, data: &[u8]) -> io::Result<u64> {
        Self::create_parent(path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        file.seek(SeekFrom::Start(start))?;
        file.write_all(data)?;
        // Flush to ensure data is written
        file.flush()?;
        file.sync_data()?;

        let size = file.metadata()?.len();
        debug!(
            "Wrote {} bytes to {} at offset {}, container now {} bytes",
            data.len(),
            path.display(),
            start,
            size
        );
        Ok(size)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                info!("Removed container {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
