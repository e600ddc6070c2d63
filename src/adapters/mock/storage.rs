//! Mock remote storage for testing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::traits::{RemoteEntry, RemoteStorage};

/// A recorded upload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub path: PathBuf,
    pub folder_id: String,
    pub remote_id: String,
}

/// In-memory remote storage.
///
/// Uploads become listed file entries, deletions remove them. Failures are
/// scripted per entry id (deletes) or by count (uploads).
#[derive(Clone, Default)]
pub struct MockStorage {
    entries: Arc<Mutex<Vec<RemoteEntry>>>,
    uploads: Arc<Mutex<Vec<RecordedUpload>>>,
    delete_attempts: Arc<Mutex<Vec<String>>>,
    failing_deletes: Arc<Mutex<HashSet<String>>>,
    upload_failures: Arc<AtomicUsize>,
    list_error: Arc<Mutex<Option<StorageError>>>,
    delete_delay: Arc<Mutex<Option<Duration>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<RemoteEntry>) -> Self {
        let storage = Self::new();
        *storage.entries.lock().unwrap() = entries;
        storage
    }

    /// Make deleting `id` fail.
    pub fn fail_delete(&self, id: &str) {
        self.failing_deletes.lock().unwrap().insert(id.to_string());
    }

    /// Fail the next `count` uploads.
    pub fn fail_next_uploads(&self, count: usize) {
        self.upload_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_list(&self, error: StorageError) {
        *self.list_error.lock().unwrap() = Some(error);
    }

    /// Make every deletion take `delay`.
    pub fn set_delete_delay(&self, delay: Duration) {
        *self.delete_delay.lock().unwrap() = Some(delay);
    }

    pub fn entries(&self) -> Vec<RemoteEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    /// Ids passed to `delete`, successful or not.
    pub fn delete_attempts(&self) -> Vec<String> {
        self.delete_attempts.lock().unwrap().clone()
    }

    /// Highest number of deletions observed in flight at once.
    pub fn max_concurrent_deletes(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStorage for MockStorage {
    async fn list(&self) -> Result<Vec<RemoteEntry>, StorageError> {
        if let Some(error) = self.list_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.entries())
    }

    async fn upload(&self, local_path: &Path, folder_id: &str) -> Result<String, StorageError> {
        let should_fail = self
            .upload_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StorageError::Api {
                operation: "upload",
                status: 500,
                message: "mock upload failure".to_string(),
            });
        }

        let mut uploads = self.uploads.lock().unwrap();
        let remote_id = format!("uploaded-{}", uploads.len() + 1);
        uploads.push(RecordedUpload {
            path: local_path.to_path_buf(),
            folder_id: folder_id.to_string(),
            remote_id: remote_id.clone(),
        });
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.entries
            .lock()
            .unwrap()
            .push(RemoteEntry::file(remote_id.clone(), name, Utc::now()));
        Ok(remote_id)
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.delete_attempts.lock().unwrap().push(id.to_string());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.delete_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_deletes.lock().unwrap().contains(id) {
            return Err(StorageError::Api {
                operation: "delete",
                status: 500,
                message: format!("mock delete failure for {}", id),
            });
        }
        self.entries.lock().unwrap().retain(|entry| entry.id != id);
        Ok(())
    }
}
