//! Unified error type for the backup orchestrator.
//!
//! `VaultBackupError` is what crosses a component boundary. Component-local
//! failures are wrapped here only when they have to be classified; most of
//! them are logged and dropped where they happen.

use thiserror::Error;

use super::category::ErrorCategory;
use super::collaborator::{AuthError, PushError, SecretError};
use crate::config::ConfigError;
use crate::pipeline::BackupError;
use crate::retention::SweepError;

/// Unified error type for the orchestrator and its components.
#[derive(Debug, Error)]
pub enum VaultBackupError {
    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging could not be initialized.
    #[error("unable to initialize logging: {0}")]
    Logging(String),

    /// The initial login at process start failed.
    #[error("initial login failed: {0}")]
    InitialLogin(#[source] AuthError),

    /// The push subscription could not be opened at startup.
    #[error("unable to open push subscription: {0}")]
    PushSubscription(#[source] PushError),

    /// The remote storage credential could not be obtained.
    #[error("unable to obtain storage credential: {0}")]
    StorageCredential(#[source] SecretError),

    /// A recurring job could not be scheduled.
    #[error("unable to start scheduler: {0}")]
    Scheduler(String),

    /// The status endpoint could not bind.
    #[error("unable to start status server: {0}")]
    StatusServer(#[source] std::io::Error),

    /// Re-login during credential renewal failed.
    #[error("re-authentication failed: {0}")]
    Reauth(#[source] AuthError),

    /// The renewal task stopped without reporting a result.
    #[error("credential renewal aborted: {0}")]
    RenewalAborted(String),

    /// A push subscription dropped mid-run.
    #[error("push subscription lost: {0}")]
    PushLost(#[source] PushError),

    /// A single backup attempt failed.
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// A retention sweep had at least one failure.
    #[error(transparent)]
    Sweep(#[from] SweepError),
}

impl VaultBackupError {
    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            VaultBackupError::Config(_)
            | VaultBackupError::Logging(_)
            | VaultBackupError::InitialLogin(_)
            | VaultBackupError::PushSubscription(_)
            | VaultBackupError::StorageCredential(_)
            | VaultBackupError::Scheduler(_)
            | VaultBackupError::StatusServer(_) => ErrorCategory::StartupFatal,
            VaultBackupError::Reauth(_) | VaultBackupError::RenewalAborted(_) => {
                ErrorCategory::ReauthFailure
            }
            VaultBackupError::PushLost(_) => ErrorCategory::ConnectionLost,
            VaultBackupError::Backup(_) | VaultBackupError::Sweep(_) => ErrorCategory::Transient,
        }
    }

    /// Whether this error must terminate the process.
    pub fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            VaultBackupError::Config(_) => "CONFIG",
            VaultBackupError::Logging(_) => "LOGGING",
            VaultBackupError::InitialLogin(_) => "INITIAL_LOGIN",
            VaultBackupError::PushSubscription(_) => "PUSH_SUBSCRIBE",
            VaultBackupError::StorageCredential(_) => "STORAGE_CREDENTIAL",
            VaultBackupError::Scheduler(_) => "SCHEDULER",
            VaultBackupError::StatusServer(_) => "STATUS_SERVER",
            VaultBackupError::Reauth(_) => "REAUTH",
            VaultBackupError::RenewalAborted(_) => "RENEWAL_ABORTED",
            VaultBackupError::PushLost(_) => "PUSH_LOST",
            VaultBackupError::Backup(_) => "BACKUP",
            VaultBackupError::Sweep(_) => "SWEEP",
        }
    }
}

/// Result type alias for orchestrator operations.
pub type VaultBackupResult<T> = Result<T, VaultBackupError>;
