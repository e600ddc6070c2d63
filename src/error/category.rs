//! Error category classification for unified error handling.
//!
//! Categories drive the single decision every component boundary has to make:
//! keep running and log, or bring the process down.

use std::fmt;

/// High-level categorization of errors for handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The process cannot start: no initial credential, no push
    /// subscription, or no scheduler.
    StartupFatal,

    /// A single unit of work failed (one backup, one deletion, one renewal
    /// cycle). Logged; the component keeps operating.
    Transient,

    /// The push subscription dropped. Terminates that source only.
    ConnectionLost,

    /// Re-login during renewal failed. No valid credential can be
    /// maintained, so the process exits.
    ReauthFailure,
}

impl ErrorCategory {
    /// Returns true if errors in this category must terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorCategory::StartupFatal | ErrorCategory::ReauthFailure)
    }

    /// Returns a short label for the category suitable for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::StartupFatal => "startup_fatal",
            ErrorCategory::Transient => "transient",
            ErrorCategory::ConnectionLost => "connection_lost",
            ErrorCategory::ReauthFailure => "reauth_failure",
        }
    }

    /// Process exit code for an error in this category.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCategory::StartupFatal => 2,
            ErrorCategory::ReauthFailure => 3,
            ErrorCategory::Transient | ErrorCategory::ConnectionLost => 1,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
