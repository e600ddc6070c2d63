//! Mock secret store for testing.
//!
//! Login results and lease-watch outcomes are scripted up front; snapshots
//! write a small file so artifact naming behaves as in production.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::{stream, StreamExt};
use tokio::sync::mpsc;

use crate::credential::Credential;
use crate::error::{AuthError, SnapshotError};
use crate::renewal::RenewalOutcome;
use crate::traits::{LeaseWatch, RoleCredentials, SecretStore, SnapshotArtifact};

/// Bytes written by every mock snapshot.
pub const MOCK_SNAPSHOT_BYTES: &[u8] = b"raft-snapshot";

enum WatchScript {
    Outcomes {
        outcomes: Vec<RenewalOutcome>,
        hold_open: bool,
    },
    Feed(mpsc::UnboundedReceiver<RenewalOutcome>),
}

/// A recorded snapshot call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSnapshot {
    pub token: String,
    pub path: PathBuf,
}

/// Mock secret store.
///
/// - Unscripted logins succeed with tokens `token-1`, `token-2`, ...
/// - Unscripted watches stay open forever
///
/// # Example
///
/// ```ignore
/// let store = MockSecretStore::new();
/// store.script_watch(vec![RenewalOutcome::Renewed(Duration::from_secs(60))]);
/// store.push_login(Err(AuthError::MissingAuth));
/// ```
#[derive(Clone, Default)]
pub struct MockSecretStore {
    logins: Arc<Mutex<VecDeque<Result<Credential, AuthError>>>>,
    login_calls: Arc<AtomicUsize>,
    watches: Arc<Mutex<VecDeque<WatchScript>>>,
    watched: Arc<Mutex<Vec<Arc<Credential>>>>,
    snapshots: Arc<Mutex<Vec<RecordedSnapshot>>>,
    snapshot_failures: Arc<AtomicUsize>,
    snapshot_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next unanswered login.
    pub fn push_login(&self, result: Result<Credential, AuthError>) {
        self.logins.lock().unwrap().push_back(result);
    }

    /// Queue a watch that yields `outcomes` and then stays open.
    pub fn script_watch(&self, outcomes: Vec<RenewalOutcome>) {
        self.watches.lock().unwrap().push_back(WatchScript::Outcomes {
            outcomes,
            hold_open: true,
        });
    }

    /// Queue a watch that yields `outcomes` and then ends.
    pub fn script_closing_watch(&self, outcomes: Vec<RenewalOutcome>) {
        self.watches.lock().unwrap().push_back(WatchScript::Outcomes {
            outcomes,
            hold_open: false,
        });
    }

    /// Queue a watch driven step by step through the returned sender.
    ///
    /// Dropping the sender ends the watch.
    pub fn feed_watch(&self) -> mpsc::UnboundedSender<RenewalOutcome> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watches.lock().unwrap().push_back(WatchScript::Feed(rx));
        tx
    }

    /// Fail the next `count` snapshot calls.
    pub fn fail_next_snapshots(&self, count: usize) {
        self.snapshot_failures.store(count, Ordering::SeqCst);
    }

    /// Make every snapshot take `delay`.
    pub fn set_snapshot_delay(&self, delay: Duration) {
        *self.snapshot_delay.lock().unwrap() = Some(delay);
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    /// Credentials passed to `watch`, in call order.
    pub fn watched(&self) -> Vec<Arc<Credential>> {
        self.watched.lock().unwrap().clone()
    }

    pub fn snapshots(&self) -> Vec<RecordedSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    async fn login(&self, _role: &RoleCredentials) -> Result<Credential, AuthError> {
        let call = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let scripted = self.logins.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(Credential::new(
                format!("token-{}", call),
                Duration::from_secs(3600),
                true,
            ))
        })
    }

    async fn watch(&self, credential: Arc<Credential>) -> LeaseWatch {
        self.watched.lock().unwrap().push(credential);
        let script = self.watches.lock().unwrap().pop_front();
        match script {
            None => stream::pending::<RenewalOutcome>().boxed(),
            Some(WatchScript::Outcomes {
                outcomes,
                hold_open: true,
            }) => stream::iter(outcomes).chain(stream::pending()).boxed(),
            Some(WatchScript::Outcomes {
                outcomes,
                hold_open: false,
            }) => stream::iter(outcomes).boxed(),
            Some(WatchScript::Feed(rx)) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|outcome| (outcome, rx))
            })
            .boxed(),
        }
    }

    async fn snapshot(
        &self,
        credential: &Credential,
        destination: &Path,
    ) -> Result<SnapshotArtifact, SnapshotError> {
        self.snapshots.lock().unwrap().push(RecordedSnapshot {
            token: credential.token().to_string(),
            path: destination.to_path_buf(),
        });

        let delay = *self.snapshot_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .snapshot_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(SnapshotError::Request {
                status: 503,
                message: "mock snapshot failure".to_string(),
            });
        }

        tokio::fs::write(destination, MOCK_SNAPSHOT_BYTES)
            .await
            .map_err(|source| SnapshotError::Io {
                path: destination.to_path_buf(),
                source,
            })?;
        Ok(SnapshotArtifact {
            path: destination.to_path_buf(),
            size_bytes: MOCK_SNAPSHOT_BYTES.len() as u64,
            created_at: Utc::now(),
        })
    }
}
