//! In-memory byte container backend for testing

use crate::storage::ByteStorage;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Mock implementation of ByteStorage for testing
#[derive(Default)]
pub struct MockByteStore {
    containers: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    fail_writes: AtomicBool,
}

impl MockByteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn containers(&self) -> MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
        self.containers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every following `ensure`/`write_at` fail with an I/O error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Current bytes of a container
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.containers().get(path).cloned()
    }

    /// Replace a container's bytes, e.g. to simulate a crash mid-write
    pub fn set_contents(&self, path: &Path, data: Vec<u8>) {
        self.containers().insert(path.to_path_buf(), data);
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.containers().contains_key(path)
    }

    pub fn container_count(&self) -> usize {
        self.containers().len()
    }

    fn check_failure(&self) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated storage failure"));
        }
        Ok(())
    }
}

impl ByteStorage for MockByteStore {
    fn ensure(&self, path: &Path) -> io::Result<u64> {
        self.check_failure()?;
        let mut containers = self.containers();
        let data = containers.entry(path.to_path_buf()).or_default();
        Ok(data.len() as u64)
    }

    fn write_at(&self, path: &Path, start: u64, data: &[u8]) -> io::Result<u64> {
        self.check_failure()?;
        let mut containers = self.containers();
        let container = containers.entry(path.to_path_buf()).or_default();
        let start = start as usize;
        let end = start + data.len();
        if container.len() < end {
            container.resize(end, 0);
        }
        container[start..end].copy_from_slice(data);
        Ok(container.len() as u64)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.containers().remove(path);
        Ok(())
    }
}
