//! Errors reported by the external collaborators.
//!
//! Each collaborator seam in `crate::traits` returns one of these. They carry
//! enough context to be logged as-is at the component boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Secret store authentication failures.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The login endpoint rejected the role credentials.
    #[error("login rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The login response carried no auth block.
    #[error("no auth info was returned after login")]
    MissingAuth,

    /// The secret store could not be reached.
    #[error("secret store unreachable: {0}")]
    Unreachable(String),

    /// A required role credential is missing.
    #[error("missing role credential: {0}")]
    MissingRoleCredential(&'static str),
}

/// Snapshot failures.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// No valid credential is installed (revoked after a failed re-login).
    #[error("no valid credential is installed")]
    NoCredential,

    /// The artifact file could not be created or written.
    #[error("snapshot file {} could not be written: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The secret store refused or failed the snapshot request.
    #[error("snapshot request failed ({status}): {message}")]
    Request { status: u16, message: String },

    /// Transport failure while streaming the snapshot.
    #[error("snapshot transport error: {0}")]
    Transport(String),
}

/// Remote storage failures (list, upload, delete).
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The storage API answered with an error status.
    #[error("{operation} failed ({status}): {message}")]
    Api {
        operation: &'static str,
        status: u16,
        message: String,
    },

    /// The storage API could not be reached.
    #[error("{operation} transport error: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The local artifact could not be read for upload.
    #[error("unable to read {}: {message}", .path.display())]
    LocalFile { path: PathBuf, message: String },

    /// A response could not be decoded.
    #[error("{operation} returned an unreadable response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

/// Push subscription failures.
#[derive(Debug, Clone, Error)]
pub enum PushError {
    /// The subscription could not be opened.
    #[error("subscription failed: {0}")]
    ConnectFailed(String),

    /// The connection dropped or the server closed it.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// An inbound message could not be decoded.
    #[error("unable to decode event: {0}")]
    Decode(String),
}

/// Secret reads from the KV v2 engine.
#[derive(Debug, Clone, Error)]
pub enum SecretError {
    /// The secret store answered with an error status.
    #[error("secret read failed ({status}): {message}")]
    Request { status: u16, message: String },

    /// The secret store could not be reached.
    #[error("secret read transport error: {0}")]
    Transport(String),

    /// The secret exists but lacks the requested key.
    #[error("secret {path} has no string key {key}")]
    MissingKey { path: String, key: String },
}

/// Notification delivery failures. Always logged, never propagated.
#[derive(Debug, Clone, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_names_operation() {
        let err = StorageError::Api {
            operation: "delete",
            status: 404,
            message: "File not found".to_string(),
        };
        assert_eq!(err.to_string(), "delete failed (404): File not found");
    }

    #[test]
    fn test_snapshot_io_error_keeps_source() {
        use std::error::Error as _;
        let err = SnapshotError::Io {
            path: PathBuf::from("/snap/1.snap"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/snap/1.snap"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::MissingAuth.to_string(),
            "no auth info was returned after login"
        );
        assert_eq!(
            AuthError::MissingRoleCredential("app_secret_id").to_string(),
            "missing role credential: app_secret_id"
        );
    }
}
