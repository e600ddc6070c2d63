//! Secret store trait abstraction.

use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::credential::Credential;
use crate::error::{AuthError, SnapshotError};
use crate::renewal::RenewalOutcome;

/// Stream of outcomes from one lease watch.
///
/// Dropping the stream stops the watch.
pub type LeaseWatch = Pin<Box<dyn Stream<Item = RenewalOutcome> + Send>>;

/// Role id / secret id pair used to log in.
#[derive(Clone, PartialEq, Eq)]
pub struct RoleCredentials {
    pub role_id: String,
    pub secret_id: String,
}

impl RoleCredentials {
    pub fn new(role_id: impl Into<String>, secret_id: impl Into<String>) -> Self {
        Self {
            role_id: role_id.into(),
            secret_id: secret_id.into(),
        }
    }
}

impl fmt::Debug for RoleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleCredentials")
            .field("role_id", &self.role_id)
            .field("secret_id", &"<redacted>")
            .finish()
    }
}

/// A snapshot written to local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Trait for secret store operations.
///
/// # Example
///
/// ```ignore
/// use vault_backup::traits::{RoleCredentials, SecretStore};
///
/// async fn first_login<S: SecretStore>(store: &S) -> Result<(), AuthError> {
///     let role = RoleCredentials::new("role-id", "secret-id");
///     let credential = store.login(&role).await?;
///     let mut watch = store.watch(Arc::new(credential)).await;
///     while let Some(outcome) = watch.next().await { /* ... */ }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Authenticate with role credentials and obtain a fresh credential.
    async fn login(&self, role: &RoleCredentials) -> Result<Credential, AuthError>;

    /// Start watching the lease of `credential`.
    ///
    /// Failures to start or continue the watch are reported as
    /// [`RenewalOutcome::Error`] items rather than an `Err`.
    async fn watch(&self, credential: Arc<Credential>) -> LeaseWatch;

    /// Write a point-in-time snapshot to `destination`.
    async fn snapshot(
        &self,
        credential: &Credential,
        destination: &Path,
    ) -> Result<SnapshotArtifact, SnapshotError>;
}
