//! Remote storage trait abstraction.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::StorageError;

/// Kind of a remote entry. Folders never count toward retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

/// One entry reported by [`RemoteStorage::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub kind: EntryKind,
}

impl RemoteEntry {
    pub fn file(id: impl Into<String>, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at,
            kind: EntryKind::File,
        }
    }

    pub fn folder(
        id: impl Into<String>,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at,
            kind: EntryKind::Folder,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    /// Age in whole days as of `now`. Entries from the future are age 0.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        let age = now.signed_duration_since(self.created_at);
        if age < Duration::zero() {
            0
        } else {
            age.num_days()
        }
    }
}

/// Trait for remote storage operations.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// List every entry visible to the backup account.
    async fn list(&self) -> Result<Vec<RemoteEntry>, StorageError>;

    /// Upload `local_path` into `folder_id`. Returns the new remote id.
    async fn upload(&self, local_path: &Path, folder_id: &str) -> Result<String, StorageError>;

    /// Delete the entry with `id`.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
}
