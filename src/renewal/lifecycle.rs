use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::types::{RenewalOutcome, RenewalState};
use crate::credential::{Credential, CredentialInstaller};
use crate::error::VaultBackupError;
use crate::traits::{RoleCredentials, SecretStore};

/// Why a watch ended without a cancellation.
enum WatchEnd {
    Cancelled,
    Relogin(String),
}

/// Owns the credential slot and drives the renewal state machine.
pub struct RenewalLoop {
    store: Arc<dyn SecretStore>,
    role: RoleCredentials,
    installer: CredentialInstaller,
    state: watch::Sender<RenewalState>,
}

impl RenewalLoop {
    pub fn new(
        store: Arc<dyn SecretStore>,
        role: RoleCredentials,
        installer: CredentialInstaller,
    ) -> Self {
        let (state, _) = watch::channel(RenewalState::Active);
        Self {
            store,
            role,
            installer,
            state,
        }
    }

    /// Receiver that observes every state transition.
    pub fn state(&self) -> watch::Receiver<RenewalState> {
        self.state.subscribe()
    }

    /// Run until cancelled or until a re-login fails.
    ///
    /// Returns `Ok(())` on cancellation. A failed re-login revokes the
    /// installed credential and returns [`VaultBackupError::Reauth`].
    pub async fn run(self, cancel: CancellationToken) -> Result<(), VaultBackupError> {
        let mut credential = self.installer.current();

        loop {
            let reason = match credential.take() {
                Some(current) => match self.watch_lease(current, &cancel).await {
                    WatchEnd::Cancelled => {
                        self.transition(RenewalState::Terminated);
                        return Ok(());
                    }
                    WatchEnd::Relogin(reason) => reason,
                },
                None => "no credential installed".to_string(),
            };

            self.transition(RenewalState::Reauthenticating);
            tracing::warn!(reason = %reason, "lease can no longer be renewed, logging in again");

            match self.store.login(&self.role).await {
                Ok(fresh) => {
                    let installed = self.install(fresh);
                    credential = Some(installed);
                }
                Err(e) => {
                    self.installer.revoke();
                    self.transition(RenewalState::Terminated);
                    tracing::error!(error = %e, "re-authentication failed, credential revoked");
                    return Err(VaultBackupError::Reauth(e));
                }
            }

            if cancel.is_cancelled() {
                self.transition(RenewalState::Terminated);
                return Ok(());
            }
        }
    }

    async fn watch_lease(&self, credential: Arc<Credential>, cancel: &CancellationToken) -> WatchEnd {
        self.transition(RenewalState::Watching);
        let mut outcomes = self.store.watch(credential).await;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => RenewalOutcome::CancelRequested,
                next = outcomes.next() => next
                    .unwrap_or_else(|| RenewalOutcome::Expiring("watcher closed".to_string())),
            };

            match outcome {
                RenewalOutcome::Renewed(remaining) => {
                    self.installer.refresh_lease(remaining);
                    tracing::info!(remaining_secs = remaining.as_secs(), "credential lease renewed");
                }
                RenewalOutcome::CancelRequested => return WatchEnd::Cancelled,
                RenewalOutcome::Expiring(cause) => return WatchEnd::Relogin(cause),
                RenewalOutcome::Error(cause) => {
                    tracing::warn!(error = %cause, "lease watcher failed");
                    return WatchEnd::Relogin(cause);
                }
            }
        }
    }

    fn install(&self, credential: Credential) -> Arc<Credential> {
        let installed = self.installer.install(credential);
        tracing::info!(
            accessor = installed.accessor().unwrap_or("-"),
            lease_secs = installed.lease_duration().as_secs(),
            "installed new credential"
        );
        installed
    }

    fn transition(&self, next: RenewalState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "renewal state changed");
        }
    }
}
