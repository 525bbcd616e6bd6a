//! In-memory implementation of MetadataStorage for tests and ephemeral servers

use crate::error::UploadError;
use crate::metadata::{metadata_version, MetadataStorage};
use crate::session::UploadFile;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Mock implementation of MetadataStorage for testing
pub struct MockMetadataStore {
    // id -> (insertion sequence, record)
    data: Arc<Mutex<HashMap<String, (u64, UploadFile)>>>,
    next_seq: Arc<Mutex<u64>>,
    version: String,
}

impl MockMetadataStore {
    /// Create a new mock metadata store
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            next_seq: Arc::new(Mutex::new(0)),
            version: metadata_version(),
        }
    }

    /// Clear all data from the store (useful for test cleanup)
    pub fn clear(&self) {
        self.data().clear();
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn data(&self) -> MutexGuard<'_, HashMap<String, (u64, UploadFile)>> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStorage for MockMetadataStore {
    fn version(&self) -> &str {
        &self.version
    }

    fn get(&self, id: &str) -> Result<Option<UploadFile>, UploadError> {
        Ok(self.data().get(id).map(|(_, file)| file.clone()))
    }

    fn set(&self, file: &UploadFile) -> Result<(), UploadError> {
        let mut data = self.data();
        let seq = match data.get(&file.id) {
            Some((seq, _)) => *seq,
            None => {
                let mut next = self.next_seq.lock().unwrap_or_else(|p| p.into_inner());
                *next += 1;
                *next
            }
        };
        data.insert(file.id.clone(), (seq, file.clone()));
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, UploadError> {
        Ok(self.data().remove(id).is_some())
    }

    fn all(&self) -> Result<Vec<UploadFile>, UploadError> {
        let data = self.data();
        let mut entries: Vec<&(u64, UploadFile)> = data.values().collect();
        entries.sort_by_key(|(seq, _)| *seq);
        Ok(entries.into_iter().map(|(_, file)| file.clone()).collect())
    }
}
