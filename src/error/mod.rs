//! Error handling for the backup orchestrator.
//!
//! - **Error Categories**: the four-way taxonomy that decides whether a
//!   failure is logged or ends the process
//! - **Collaborator Errors**: what the secret store, remote storage, push
//!   feed and notifier report
//! - **Unified Error Type**: `VaultBackupError` for anything that crosses a
//!   component boundary
//!
//! | Category | Example | Process exits |
//! |----------|---------|---------------|
//! | StartupFatal | initial login fails | Yes |
//! | Transient | one upload fails | No |
//! | ConnectionLost | push socket drops | No |
//! | ReauthFailure | re-login during renewal fails | Yes |

mod category;
mod collaborator;
mod vault_backup_error;

pub use category::ErrorCategory;
pub use collaborator::{
    AuthError, NotifyError, PushError, SecretError, SnapshotError, StorageError,
};
pub use vault_backup_error::{VaultBackupError, VaultBackupResult};
