//! Configuration for upload storage backends

use crate::metadata::MetadataStorage;
use crate::storage::{
    local_store::LocalDiskStore, mock_store::MockByteStore, session_store::SessionStorage,
    ByteStorage, Destination, UploadStorage,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

/// Available byte storage backends
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum StorageBackend {
    #[default]
    Disk,
    Mock,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disk" | "local" => Ok(StorageBackend::Disk),
            "mock" | "memory" => Ok(StorageBackend::Mock),
            _ => Err(format!("Unknown storage backend: {}", s)),
        }
    }
}

/// Configuration for upload storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Byte storage backend type
    pub backend: StorageBackend,
    /// Directory holding one container per session
    pub destination: String,
    /// Keep containers of finalized uploads
    pub retain_completed: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            destination: "./data/uploads".to_string(),
            retain_completed: true,
        }
    }
}

impl StorageConfig {
    /// Let `STORAGE_BACKEND` and `UPLOAD_DESTINATION` override the file values
    pub fn apply_env(&mut self) {
        if let Ok(backend_str) = env::var("STORAGE_BACKEND") {
            match backend_str.parse::<StorageBackend>() {
                Ok(backend) => {
                    info!("Using storage backend from environment: {:?}", backend);
                    self.backend = backend;
                }
                Err(e) => warn!("Invalid storage backend in environment: {}. Keeping {:?}.", e, self.backend),
            }
        }
        if let Ok(dir) = env::var("UPLOAD_DESTINATION") {
            info!("Using upload destination from environment: {}", dir);
            self.destination = dir;
        }
    }

    pub fn destination(&self) -> Destination {
        Destination::directory(PathBuf::from(&self.destination))
    }

    /// Create the storage facade over the given metadata store
    pub fn create_store(&self, metadata: Arc<dyn MetadataStorage>) -> Arc<dyn UploadStorage> {
        self.create_store_with(metadata, self.destination())
    }

    /// Same as [`create_store`](Self::create_store) with a custom destination policy
    pub fn create_store_with(
        &self,
        metadata: Arc<dyn MetadataStorage>,
        destination: Destination,
    ) -> Arc<dyn UploadStorage> {
        let bytes: Arc<dyn ByteStorage> = match self.backend {
            StorageBackend::Disk => {
                info!("Using local disk storage at {:?}", destination);
                Arc::new(LocalDiskStore::new())
            }
            StorageBackend::Mock => {
                info!("Using in-memory mock storage");
                Arc::new(MockByteStore::new())
            }
        };
        Arc::new(
            SessionStorage::new(metadata, bytes, destination).retain_completed(self.retain_completed),
        )
    }
}
