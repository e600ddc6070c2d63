//! In-memory backup status.
//!
//! The pipeline records every backup outcome, the sweeper every sweep, and
//! the renewal loop's state is observed through its watch channel. Nothing
//! here survives a restart.

mod server;

pub use server::{router, start_status_server_on};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock};

use crate::credential::{CredentialHandle, LeaseStatus};
use crate::merger::{MergerStats, MergerStatsHandle};
use crate::renewal::RenewalState;
use crate::trigger::{Destination, TriggerSource};

/// Outcome of one backup attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub source: TriggerSource,
    pub destination: Destination,
    pub path: String,
    /// Remote id of the uploaded artifact, on success.
    pub remote_id: Option<String>,
    /// Failure description, on failure.
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of one retention sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepRecord {
    pub selected: usize,
    pub deleted: usize,
    pub failed: usize,
    pub finished_at: DateTime<Utc>,
}

/// Everything served by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub renewal_state: Option<RenewalState>,
    pub credential_generation: Option<u64>,
    pub lease: Option<LeaseStatus>,
    pub last_success: Option<BackupRecord>,
    pub last_failure: Option<BackupRecord>,
    pub successful_backups: u64,
    pub failed_backups: u64,
    pub last_sweep: Option<SweepRecord>,
    pub merger: Option<MergerStats>,
}

struct Inner {
    started_at: DateTime<Utc>,
    renewal: Option<watch::Receiver<RenewalState>>,
    credentials: Option<CredentialHandle>,
    merger: Option<MergerStatsHandle>,
    last_success: Option<BackupRecord>,
    last_failure: Option<BackupRecord>,
    successful_backups: u64,
    failed_backups: u64,
    last_sweep: Option<SweepRecord>,
}

/// Shared status record. Cheap to clone.
#[derive(Clone)]
pub struct StatusTracker {
    inner: Arc<RwLock<Inner>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                started_at: Utc::now(),
                renewal: None,
                credentials: None,
                merger: None,
                last_success: None,
                last_failure: None,
                successful_backups: 0,
                failed_backups: 0,
                last_sweep: None,
            })),
        }
    }

    /// Follow the renewal loop's state.
    pub async fn attach_renewal(&self, state: watch::Receiver<RenewalState>) {
        self.inner.write().await.renewal = Some(state);
    }

    /// Report lease and generation of the credential slot.
    pub async fn attach_credentials(&self, credentials: CredentialHandle) {
        self.inner.write().await.credentials = Some(credentials);
    }

    /// Report the merger's counters.
    pub async fn attach_merger(&self, merger: MergerStatsHandle) {
        self.inner.write().await.merger = Some(merger);
    }

    pub async fn record_backup(&self, record: BackupRecord) {
        let mut inner = self.inner.write().await;
        if record.error.is_some() {
            inner.failed_backups += 1;
            inner.last_failure = Some(record);
        } else {
            inner.successful_backups += 1;
            inner.last_success = Some(record);
        }
    }

    pub async fn record_sweep(&self, record: SweepRecord) {
        self.inner.write().await.last_sweep = Some(record);
    }

    /// Current renewal state, if a renewal loop is attached.
    pub async fn renewal_state(&self) -> Option<RenewalState> {
        self.inner
            .read()
            .await
            .renewal
            .as_ref()
            .map(|state| *state.borrow())
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.read().await;
        let now = Utc::now();
        StatusSnapshot {
            started_at: inner.started_at,
            uptime_secs: now.signed_duration_since(inner.started_at).num_seconds(),
            renewal_state: inner.renewal.as_ref().map(|state| *state.borrow()),
            credential_generation: inner.credentials.as_ref().map(|c| c.generation()),
            lease: inner.credentials.as_ref().and_then(|c| c.lease()),
            last_success: inner.last_success.clone(),
            last_failure: inner.last_failure.clone(),
            successful_backups: inner.successful_backups,
            failed_backups: inner.failed_backups,
            last_sweep: inner.last_sweep.clone(),
            merger: inner.merger.as_ref().map(|m| m.snapshot()),
        }
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}
