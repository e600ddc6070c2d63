//! End-to-end tests of the orchestrator over mock collaborators.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{eventually, file_aged, test_targets, EVENT_FOLDER, SCHEDULED_FOLDER};
use tokio_util::sync::CancellationToken;
use vault_backup::adapters::mock::{MockEventSubscriber, MockSecretStore, MockStorage, RecordingNotifier};
use vault_backup::error::{AuthError, ErrorCategory, PushError, VaultBackupError};
use vault_backup::orchestrator::{Collaborators, Orchestrator, Settings};
use vault_backup::renewal::{RenewalOutcome, RenewalState};
use vault_backup::sources::ReconnectPolicy;
use vault_backup::traits::RoleCredentials;

struct Harness {
    store: Arc<MockSecretStore>,
    storage: Arc<MockStorage>,
    subscriber: Arc<MockEventSubscriber>,
    notifier: Arc<RecordingNotifier>,
    dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: Arc::new(MockSecretStore::new()),
            storage: Arc::new(MockStorage::new()),
            subscriber: Arc::new(MockEventSubscriber::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn settings(&self) -> Settings {
        Settings {
            role: RoleCredentials::new("role-id", "secret-id"),
            snapshot_folder: self.dir.path().to_path_buf(),
            targets: test_targets(),
            scheduled_interval: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(3600),
            retention_days: 30,
            max_concurrent_deletes: 2,
            queue_capacity: 10,
            reconnect: ReconnectPolicy::disabled(),
            status_bind: None,
            shutdown_grace: Duration::from_secs(1),
        }
    }

    fn orchestrator(&self, settings: Settings) -> Orchestrator {
        Orchestrator::new(
            settings,
            Collaborators {
                store: self.store.clone(),
                storage: self.storage.clone(),
                subscriber: self.subscriber.clone(),
                notifier: self.notifier.clone(),
            },
        )
    }
}

#[tokio::test]
async fn test_initial_login_failure_is_startup_fatal() {
    let h = Harness::new();
    h.store.push_login(Err(AuthError::Rejected {
        status: 400,
        message: "invalid role id".into(),
    }));

    let err = h
        .orchestrator(h.settings())
        .run(CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VaultBackupError::InitialLogin(_)));
    assert_eq!(err.category(), ErrorCategory::StartupFatal);
    assert_ne!(err.exit_code(), 0);
    assert!(h.store.snapshots().is_empty());

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.contains("INITIAL_LOGIN"));
}

#[tokio::test]
async fn test_push_subscription_failure_is_startup_fatal() {
    let h = Harness::new();
    h.subscriber
        .push_failure(PushError::ConnectFailed("403 permission denied".into()));

    let err = h
        .orchestrator(h.settings())
        .run(CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VaultBackupError::PushSubscription(_)));
    assert!(err.is_fatal());
    assert!(h.storage.uploads().is_empty());
}

#[tokio::test]
async fn test_zero_interval_fails_to_schedule() {
    let h = Harness::new();
    let _feed = h.subscriber.push_feed();
    let mut settings = h.settings();
    settings.scheduled_interval = Duration::ZERO;

    let err = h
        .orchestrator(settings)
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, VaultBackupError::Scheduler(_)));
    assert_eq!(err.category(), ErrorCategory::StartupFatal);
}

#[tokio::test]
async fn test_runs_all_components_until_shutdown() {
    let h = Harness::new();
    let feed = h.subscriber.push_feed();
    let now = Utc::now();
    let storage = Arc::new(MockStorage::with_entries(vec![
        file_aged("expired", now, 45),
        file_aged("recent", now, 3),
    ]));

    let orchestrator = Orchestrator::new(
        h.settings(),
        Collaborators {
            store: h.store.clone(),
            storage: storage.clone(),
            subscriber: h.subscriber.clone(),
            notifier: h.notifier.clone(),
        },
    );
    let status = orchestrator.status();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(orchestrator.run(shutdown.clone()));

    // The timer fires on start.
    eventually(|| storage.uploads().iter().any(|u| u.folder_id == SCHEDULED_FOLDER)).await;

    feed.send_event("kv-v2/data-write");
    eventually(|| storage.uploads().iter().any(|u| u.folder_id == EVENT_FOLDER)).await;

    // The sweeper runs on start as well; uploads are fresh and survive.
    eventually(|| !storage.entries().iter().any(|e| e.id == "expired")).await;
    assert!(storage.entries().iter().any(|e| e.id == "recent"));

    let snapshot = status.snapshot().await;
    assert_eq!(snapshot.renewal_state, Some(RenewalState::Watching));
    assert_eq!(snapshot.credential_generation, Some(1));
    assert!(snapshot.successful_backups >= 2);

    shutdown.cancel();
    task.await.unwrap().unwrap();

    assert!(feed.is_closed());
    assert_eq!(status.renewal_state().await, Some(RenewalState::Terminated));
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_reauth_failure_stops_the_process() {
    let h = Harness::new();
    let _feed = h.subscriber.push_feed();
    let watch = h.store.feed_watch();
    // First login succeeds with the default credential, the re-login fails.
    h.store.push_login(Ok(common::test_credential("initial")));
    h.store.push_login(Err(AuthError::Rejected {
        status: 403,
        message: "secret id expired".into(),
    }));

    let orchestrator = h.orchestrator(h.settings());
    let status = orchestrator.status();
    let task = tokio::spawn(orchestrator.run(CancellationToken::new()));

    eventually(|| h.store.watched().len() == 1).await;
    watch
        .send(RenewalOutcome::Expiring("lease exhausted".into()))
        .unwrap();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, VaultBackupError::Reauth(_)));
    assert_eq!(err.category(), ErrorCategory::ReauthFailure);
    assert_eq!(err.exit_code(), ErrorCategory::ReauthFailure.exit_code());

    let snapshot = status.snapshot().await;
    assert_eq!(snapshot.renewal_state, Some(RenewalState::Terminated));
    assert!(snapshot.lease.is_none());

    let sent = h.notifier.sent();
    assert!(sent.iter().any(|(subject, _)| subject.contains("REAUTH")));
}

#[tokio::test]
async fn test_status_server_reports_health() {
    let h = Harness::new();
    let _feed = h.subscriber.push_feed();
    let mut settings = h.settings();
    settings.status_bind = Some("127.0.0.1:0".parse().unwrap());

    let (tx, rx) = tokio::sync::oneshot::channel();
    let orchestrator = h.orchestrator(settings).on_status_bound(tx);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(orchestrator.run(shutdown.clone()));

    let addr = rx.await.unwrap();
    let client = reqwest::Client::new();

    let health = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), 200);

    let body: serde_json::Value = client
        .get(format!("http://{}/status", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body.get("uptime_secs").is_some());
    assert!(body.get("merger").is_some());

    shutdown.cancel();
    task.await.unwrap().unwrap();
}
