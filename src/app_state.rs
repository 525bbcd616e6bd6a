//! Application State Management
//!
//! This module provides the application state that contains the upload service
//! and its dependencies, following the dependency injection pattern.

use std::sync::Arc;

use log::info;

use crate::config::{AppConfig, MetadataBackend, StorageBackend};
use crate::error::UploadError;
use crate::service::UploadService;
use crate::storage::UploadStorage;

/// Application state shared by all workers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<UploadService>,
    pub config: AppConfig,
}

impl AppState {
    /// Create application state from configuration
    pub fn from_config(config: AppConfig) -> Result<Self, UploadError> {
        info!("Initializing application state with configuration");
        let metadata = config.metadata.create_store()?;
        let storage = config.storage.create_store(metadata);
        Self::with_storage(config, storage)
    }

    /// Create application state over an already built storage facade
    pub fn with_storage(config: AppConfig, storage: Arc<dyn UploadStorage>) -> Result<Self, UploadError> {
        let service = Arc::new(UploadService::new(storage, config.upload.clone())?);
        info!("Application state initialized successfully");
        Ok(Self { service, config })
    }

    /// Create application state for testing with mock backends
    pub fn new_for_testing() -> Result<Self, UploadError> {
        let mut config = AppConfig::default();
        config.metadata.backend = MetadataBackend::Mock;
        config.storage.backend = StorageBackend::Mock;
        Self::from_config(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{UploadOutcome, UploadRequest};

    #[tokio::test]
    async fn test_testing_state_is_empty() {
        let state = AppState::new_for_testing().unwrap();
        let listing = state.service.find(UploadRequest::new().with_user("alice")).await.unwrap();
        assert_eq!(listing, UploadOutcome::Listing(vec![]));
    }

    #[test]
    fn test_invalid_mime_pattern_fails_startup() {
        let mut config = AppConfig::default();
        config.metadata.backend = MetadataBackend::Mock;
        config.storage.backend = StorageBackend::Mock;
        config.upload.allow_mime = vec!["[unclosed".to_string()];
        assert!(AppState::from_config(config).is_err());
    }
}
