//! Common test utilities for integration tests.
//!
//! Fixtures shared by the component tests: credentials, deploy targets,
//! remote entries of a given age, and a polling helper for conditions that
//! become true on another task.
//!
//! # Example
//!
//! ```ignore
//! let storage = MockStorage::with_entries(vec![file_aged("old", now, 40)]);
//! eventually(|| storage.entries().is_empty()).await;
//! ```

#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use vault_backup::credential::Credential;
use vault_backup::traits::RemoteEntry;
use vault_backup::trigger::DeployTargets;

pub const EVENT_FOLDER: &str = "event-folder";
pub const SCHEDULED_FOLDER: &str = "scheduled-folder";

/// A renewable credential with a one hour lease.
pub fn test_credential(token: &str) -> Credential {
    Credential::new(token, Duration::from_secs(3600), true)
}

pub fn test_targets() -> DeployTargets {
    DeployTargets::new(EVENT_FOLDER, SCHEDULED_FOLDER)
}

/// A file entry created `days` days before `now`.
pub fn file_aged(id: &str, now: DateTime<Utc>, days: i64) -> RemoteEntry {
    RemoteEntry::file(id, format!("{}.snap", id), now - chrono::Duration::days(days))
}

/// A folder entry created `days` days before `now`.
pub fn folder_aged(id: &str, now: DateTime<Utc>, days: i64) -> RemoteEntry {
    RemoteEntry::folder(id, id, now - chrono::Duration::days(days))
}

/// Poll `condition` until it holds, failing after two seconds.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
