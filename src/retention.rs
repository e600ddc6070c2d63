//! Retention sweeper.
//!
//! On a fixed interval, lists every remote entry, selects the files older
//! than the retention window and deletes them concurrently. A sweep always
//! waits for every deletion it started before reporting.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{StorageError, VaultBackupError};
use crate::status::{StatusTracker, SweepRecord};
use crate::traits::{RemoteEntry, RemoteStorage};

/// Default bound on deletions in flight.
pub const DEFAULT_MAX_CONCURRENT_DELETES: usize = 4;

/// Entries whose whole-day age is strictly greater than `retention_days`.
///
/// Folders are never selected.
pub fn select_expired(
    entries: &[RemoteEntry],
    now: DateTime<Utc>,
    retention_days: u32,
) -> Vec<RemoteEntry> {
    entries
        .iter()
        .filter(|entry| !entry.is_folder())
        .filter(|entry| entry.age_days(now) > i64::from(retention_days))
        .cloned()
        .collect()
}

/// Aggregated failure of a sweep.
///
/// Keeps every cause; displays the first one and how many there were.
#[derive(Debug)]
pub struct SweepError {
    failures: Vec<(String, StorageError)>,
}

impl SweepError {
    /// A listing failure or a set of deletion failures keyed by entry id.
    pub fn new(failures: Vec<(String, StorageError)>) -> Self {
        Self { failures }
    }

    pub fn failures(&self) -> &[(String, StorageError)] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failures.first() {
            None => write!(f, "retention sweep failed"),
            Some((id, cause)) if self.failures.len() == 1 => {
                write!(f, "retention sweep failed for {}: {}", id, cause)
            }
            Some((id, cause)) => write!(
                f,
                "retention sweep failed for {} entries, first {}: {}",
                self.failures.len(),
                id,
                cause
            ),
        }
    }
}

impl std::error::Error for SweepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|(_, cause)| cause as &(dyn std::error::Error + 'static))
    }
}

/// Result of one sweep cycle.
#[derive(Debug)]
pub struct SweepReport {
    /// Entries selected for deletion.
    pub selected: usize,
    /// Deletions that succeeded.
    pub deleted: usize,
    /// Present when at least one deletion failed.
    pub failure: Option<SweepError>,
}

impl SweepReport {
    pub fn into_result(self) -> Result<usize, SweepError> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self.deleted),
        }
    }
}

/// Periodic deletion of expired remote backups.
pub struct RetentionSweeper {
    storage: Arc<dyn RemoteStorage>,
    retention_days: u32,
    max_concurrent: usize,
    status: StatusTracker,
}

impl RetentionSweeper {
    pub fn new(storage: Arc<dyn RemoteStorage>, retention_days: u32) -> Self {
        Self {
            storage,
            retention_days,
            max_concurrent: DEFAULT_MAX_CONCURRENT_DELETES,
            status: StatusTracker::new(),
        }
    }

    /// Bound deletions in flight. Zero is treated as one.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_status(mut self, status: StatusTracker) -> Self {
        self.status = status;
        self
    }

    /// Run one sweep as of `now`.
    ///
    /// A listing failure means nothing was selected and is reported as the
    /// only failure.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let entries = match self.storage.list().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(error = %e, "unable to list remote backups");
                return SweepReport {
                    selected: 0,
                    deleted: 0,
                    failure: Some(SweepError::new(vec![("<list>".to_string(), e)])),
                };
            }
        };

        let expired = select_expired(&entries, now, self.retention_days);
        tracing::info!(
            listed = entries.len(),
            expired = expired.len(),
            retention_days = self.retention_days,
            "retention sweep selected entries"
        );

        let outcomes: Vec<(RemoteEntry, Result<(), StorageError>)> = stream::iter(expired)
            .map(|entry| {
                let storage = Arc::clone(&self.storage);
                async move {
                    let result = storage.delete(&entry.id).await;
                    (entry, result)
                }
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let selected = outcomes.len();
        let mut deleted = 0;
        let mut failures = Vec::new();
        for (entry, result) in outcomes {
            match result {
                Ok(()) => {
                    deleted += 1;
                    tracing::info!(
                        id = %entry.id,
                        name = %entry.name,
                        age_days = entry.age_days(now),
                        "deleted expired backup"
                    );
                }
                Err(e) => {
                    tracing::error!(id = %entry.id, name = %entry.name, error = %e, "failed to delete expired backup");
                    failures.push((entry.id, e));
                }
            }
        }

        SweepReport {
            selected,
            deleted,
            failure: (!failures.is_empty()).then(|| SweepError::new(failures)),
        }
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep on start and then once per `interval` until cancelled.
    ///
    /// An in-progress sweep is finished before cancellation is observed.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) -> Result<(), VaultBackupError> {
        if interval.is_zero() {
            return Err(VaultBackupError::Scheduler(
                "retention sweep interval must be greater than zero".to_string(),
            ));
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = %humantime::format_duration(interval), "retention sweeper started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let report = self.sweep().await;
            self.status
                .record_sweep(SweepRecord {
                    selected: report.selected,
                    deleted: report.deleted,
                    failed: report.failure.as_ref().map_or(0, SweepError::len),
                    finished_at: Utc::now(),
                })
                .await;

            match report.into_result() {
                Ok(deleted) => tracing::info!(deleted, "retention sweep finished"),
                Err(e) => {
                    let err = VaultBackupError::from(e);
                    tracing::warn!(error = %err, code = err.error_code(), "retention sweep finished with failures");
                }
            }
        }

        tracing::info!("retention sweeper stopped");
        Ok(())
    }
}
