//! Backup pipeline: one snapshot and one upload per merged trigger.
//!
//! Triggers are consumed strictly one at a time. A failure is logged, recorded
//! and notified, and the loop moves on to the next trigger.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::credential::CredentialHandle;
use crate::error::{SnapshotError, StorageError};
use crate::merger::MergeReceiver;
use crate::status::{BackupRecord, StatusTracker};
use crate::traits::{NoopNotifier, Notifier, RemoteStorage, SecretStore, SnapshotArtifact};
use crate::trigger::{DeployTargets, Destination, Trigger, TriggerSource};

/// Failure of one backup attempt.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("{trigger} snapshot into {} failed: {source}", .path.display())]
    Snapshot {
        trigger: TriggerSource,
        path: PathBuf,
        #[source]
        source: SnapshotError,
    },

    #[error("{trigger} upload of {} to {destination} ({folder}) failed: {source}", .path.display())]
    Upload {
        trigger: TriggerSource,
        path: PathBuf,
        destination: Destination,
        folder: String,
        #[source]
        source: StorageError,
    },
}

/// A successfully deployed artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployed {
    pub artifact: SnapshotArtifact,
    pub folder: String,
    pub remote_id: String,
}

/// File name for an artifact created at `unix_seconds`.
///
/// `collision` 0 gives `<unix>.snap`, anything else `<unix>-<n>.snap`.
pub fn artifact_file_name(unix_seconds: i64, collision: u32) -> String {
    if collision == 0 {
        format!("{}.snap", unix_seconds)
    } else {
        format!("{}-{}.snap", unix_seconds, collision)
    }
}

/// First free artifact path in `folder` for `unix_seconds`.
pub async fn next_artifact_path(folder: &Path, unix_seconds: i64) -> PathBuf {
    let mut collision = 0;
    loop {
        let candidate = folder.join(artifact_file_name(unix_seconds, collision));
        match tokio::fs::try_exists(&candidate).await {
            Ok(true) => collision += 1,
            _ => return candidate,
        }
    }
}

/// Consumes merged triggers and deploys a snapshot for each.
pub struct BackupPipeline {
    store: Arc<dyn SecretStore>,
    storage: Arc<dyn RemoteStorage>,
    credentials: CredentialHandle,
    targets: DeployTargets,
    snapshot_folder: PathBuf,
    notifier: Arc<dyn Notifier>,
    status: StatusTracker,
}

impl BackupPipeline {
    pub fn new(
        store: Arc<dyn SecretStore>,
        storage: Arc<dyn RemoteStorage>,
        credentials: CredentialHandle,
        targets: DeployTargets,
        snapshot_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            storage,
            credentials,
            targets,
            snapshot_folder: snapshot_folder.into(),
            notifier: Arc::new(NoopNotifier),
            status: StatusTracker::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_status(mut self, status: StatusTracker) -> Self {
        self.status = status;
        self
    }

    /// Consume triggers until cancelled or until every producer is gone.
    ///
    /// On cancellation the merger stops accepting new triggers and those
    /// already queued are still backed up before the loop returns.
    pub async fn run(&self, mut triggers: MergeReceiver<Trigger>, cancel: CancellationToken) {
        tracing::info!(folder = %self.snapshot_folder.display(), "backup pipeline started");
        loop {
            let trigger = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = triggers.recv() => match next {
                    Some(trigger) => trigger,
                    None => break,
                },
            };
            self.handle(trigger).await;
        }

        triggers.close();
        let pending = triggers.stats().snapshot().pending();
        if pending > 0 {
            tracing::info!(pending, "draining queued triggers before shutdown");
        }
        while let Some(trigger) = triggers.recv().await {
            self.handle(trigger).await;
        }
        tracing::info!("backup pipeline stopped");
    }

    /// Process one trigger and record its outcome. Never fails.
    pub async fn handle(&self, trigger: Trigger) {
        match self.process(&trigger).await {
            Ok(deployed) => {
                tracing::info!(
                    trigger = %trigger.source,
                    path = %deployed.artifact.path.display(),
                    destination = %trigger.destination,
                    folder = %deployed.folder,
                    remote_id = %deployed.remote_id,
                    bytes = deployed.artifact.size_bytes,
                    "backup deployed"
                );
                self.status
                    .record_backup(BackupRecord {
                        source: trigger.source,
                        destination: trigger.destination,
                        path: deployed.artifact.path.display().to_string(),
                        remote_id: Some(deployed.remote_id),
                        error: None,
                        finished_at: Utc::now(),
                    })
                    .await;
            }
            Err(e) => {
                let path = match &e {
                    BackupError::Snapshot { path, .. } | BackupError::Upload { path, .. } => {
                        path.display().to_string()
                    }
                };
                tracing::error!(
                    trigger = %trigger.source,
                    path = %path,
                    destination = %trigger.destination,
                    error = %e,
                    "backup failed"
                );
                self.status
                    .record_backup(BackupRecord {
                        source: trigger.source,
                        destination: trigger.destination,
                        path,
                        remote_id: None,
                        error: Some(e.to_string()),
                        finished_at: Utc::now(),
                    })
                    .await;
                let subject = format!("Vault backup failed ({} trigger)", trigger.source);
                if let Err(notify_err) = self.notifier.notify(&subject, &e.to_string()).await {
                    tracing::warn!(error = %notify_err, "failed to send backup failure notification");
                }
            }
        }
    }

    /// Snapshot into a fresh artifact, then upload it to the trigger's target.
    pub async fn process(&self, trigger: &Trigger) -> Result<Deployed, BackupError> {
        let path = next_artifact_path(&self.snapshot_folder, Utc::now().timestamp()).await;
        let snapshot_failed = |source: SnapshotError| BackupError::Snapshot {
            trigger: trigger.source,
            path: path.clone(),
            source,
        };

        // Read the slot per trigger so a re-login is picked up immediately.
        let credential = self
            .credentials
            .current()
            .ok_or_else(|| snapshot_failed(SnapshotError::NoCredential))?;

        tokio::fs::create_dir_all(&self.snapshot_folder)
            .await
            .map_err(|source| {
                snapshot_failed(SnapshotError::Io {
                    path: self.snapshot_folder.clone(),
                    source,
                })
            })?;

        let artifact = self
            .store
            .snapshot(&credential, &path)
            .await
            .map_err(snapshot_failed)?;
        tracing::debug!(path = %artifact.path.display(), bytes = artifact.size_bytes, "snapshot written");

        let folder = self.targets.resolve(trigger.destination).to_string();
        let remote_id = self
            .storage
            .upload(&artifact.path, &folder)
            .await
            .map_err(|source| BackupError::Upload {
                trigger: trigger.source,
                path: artifact.path.clone(),
                destination: trigger.destination,
                folder: folder.clone(),
                source,
            })?;

        Ok(Deployed {
            artifact,
            folder,
            remote_id,
        })
    }
}
