//! Integration tests for the backup pipeline.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, test_credential, test_targets, EVENT_FOLDER, SCHEDULED_FOLDER};
use tokio_util::sync::CancellationToken;
use vault_backup::adapters::mock::{MockSecretStore, MockStorage, RecordingNotifier, MOCK_SNAPSHOT_BYTES};
use vault_backup::credential::{credential_slot, CredentialInstaller};
use vault_backup::error::SnapshotError;
use vault_backup::merger::merge_channel;
use vault_backup::pipeline::{BackupError, BackupPipeline};
use vault_backup::status::StatusTracker;
use vault_backup::trigger::{Destination, Trigger};

struct Fixture {
    store: Arc<MockSecretStore>,
    storage: Arc<MockStorage>,
    notifier: Arc<RecordingNotifier>,
    status: StatusTracker,
    installer: CredentialInstaller,
    pipeline: BackupPipeline,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MockSecretStore::new());
    let storage = Arc::new(MockStorage::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let status = StatusTracker::new();
    let (installer, handle) = credential_slot(test_credential("pipeline-token"));

    let pipeline = BackupPipeline::new(
        store.clone(),
        storage.clone(),
        handle,
        test_targets(),
        dir.path().join("snapshots"),
    )
    .with_notifier(notifier.clone())
    .with_status(status.clone());

    Fixture {
        store,
        storage,
        notifier,
        status,
        installer,
        pipeline,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_destinations_are_never_swapped() {
    let f = fixture();

    let pushed = f.pipeline.process(&Trigger::push("kv-v2/data-write")).await.unwrap();
    let scheduled = f.pipeline.process(&Trigger::scheduled()).await.unwrap();

    assert_eq!(pushed.folder, EVENT_FOLDER);
    assert_eq!(scheduled.folder, SCHEDULED_FOLDER);

    let uploads = f.storage.uploads();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].folder_id, EVENT_FOLDER);
    assert_eq!(uploads[1].folder_id, SCHEDULED_FOLDER);
}

#[tokio::test]
async fn test_artifacts_are_written_and_never_overwritten() {
    let f = fixture();

    let first = f.pipeline.process(&Trigger::scheduled()).await.unwrap();
    let second = f.pipeline.process(&Trigger::scheduled()).await.unwrap();

    assert_ne!(first.artifact.path, second.artifact.path);
    assert_eq!(std::fs::read(&first.artifact.path).unwrap(), MOCK_SNAPSHOT_BYTES);
    assert_eq!(std::fs::read(&second.artifact.path).unwrap(), MOCK_SNAPSHOT_BYTES);
    assert!(first
        .artifact
        .path
        .extension()
        .is_some_and(|ext| ext == "snap"));

    let snapshots = f.store.snapshots();
    assert!(snapshots.iter().all(|s| s.token == "pipeline-token"));
}

#[tokio::test]
async fn test_snapshot_failure_does_not_stop_the_next_trigger() {
    let f = fixture();
    f.store.fail_next_snapshots(1);

    let (tx, rx) = merge_channel(10);
    tx.send(Trigger::push("first")).await.unwrap();
    tx.send(Trigger::scheduled()).await.unwrap();
    drop(tx);

    f.pipeline.run(rx, CancellationToken::new()).await;

    assert_eq!(f.store.snapshots().len(), 2);
    let uploads = f.storage.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].folder_id, SCHEDULED_FOLDER);

    let snapshot = f.status.snapshot().await;
    assert_eq!(snapshot.successful_backups, 1);
    assert_eq!(snapshot.failed_backups, 1);
    let failure = snapshot.last_failure.unwrap();
    assert_eq!(failure.destination, Destination::EventDriven);
    assert!(failure.error.unwrap().contains("mock snapshot failure"));

    let sent = f.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.contains("push"));
}

#[tokio::test]
async fn test_upload_failure_carries_full_context() {
    let f = fixture();
    f.storage.fail_next_uploads(1);

    let err = f.pipeline.process(&Trigger::push("write")).await.unwrap_err();
    match &err {
        BackupError::Upload {
            destination, folder, ..
        } => {
            assert_eq!(*destination, Destination::EventDriven);
            assert_eq!(folder, EVENT_FOLDER);
        }
        other => panic!("expected upload failure, got {:?}", other),
    }
    let message = err.to_string();
    assert!(message.contains("push"));
    assert!(message.contains(".snap"));
    assert!(message.contains(EVENT_FOLDER));
}

#[tokio::test]
async fn test_triggers_are_consumed_one_at_a_time() {
    let f = Arc::new(fixture());
    f.store.set_snapshot_delay(Duration::from_millis(100));

    let (tx, rx) = merge_channel(10);
    let stats = tx.stats();
    for _ in 0..3 {
        tx.send(Trigger::scheduled()).await.unwrap();
    }

    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let f = f.clone();
        let cancel = cancel.clone();
        async move { f.pipeline.run(rx, cancel).await }
    });

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(stats.snapshot().dequeued, 1);

    eventually(|| f.storage.uploads().len() == 3).await;
    cancel.cancel();
    task.await.unwrap();
    drop(tx);
}

#[tokio::test]
async fn test_revoked_credential_is_never_used() {
    let f = fixture();
    f.installer.revoke();

    let err = f.pipeline.process(&Trigger::scheduled()).await.unwrap_err();
    assert!(matches!(
        err,
        BackupError::Snapshot {
            source: SnapshotError::NoCredential,
            ..
        }
    ));
    assert!(f.store.snapshots().is_empty());
}

#[tokio::test]
async fn test_new_credential_is_picked_up_immediately() {
    let f = fixture();
    f.installer.install(test_credential("relogged"));

    f.pipeline.process(&Trigger::scheduled()).await.unwrap();
    assert_eq!(f.store.snapshots()[0].token, "relogged");
}

#[tokio::test]
async fn test_cancellation_drains_queued_triggers() {
    let f = fixture();

    let (tx, rx) = merge_channel(10);
    let stats = tx.stats();
    tx.send(Trigger::scheduled()).await.unwrap();
    tx.send(Trigger::push("kv-v2/data-write")).await.unwrap();
    tx.send(Trigger::scheduled()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    f.pipeline.run(rx, cancel).await;

    let seen = stats.snapshot();
    assert_eq!(seen.enqueued, 3);
    assert_eq!(seen.dequeued, 3);
    assert_eq!(f.store.snapshots().len(), 3);

    let folders: Vec<_> = f.storage.uploads().into_iter().map(|u| u.folder_id).collect();
    assert_eq!(folders, vec![SCHEDULED_FOLDER, EVENT_FOLDER, SCHEDULED_FOLDER]);

    // Nothing new is accepted once the pipeline has stopped.
    assert!(tx.send(Trigger::scheduled()).await.is_err());
}
