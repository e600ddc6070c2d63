//! Renewal outcomes and loop states.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Result of one lease-watch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// The lease was extended in place; carries the remaining duration.
    Renewed(Duration),
    /// The lease can no longer be extended.
    Expiring(String),
    /// The watcher observed a shutdown request.
    CancelRequested,
    /// The watcher failed to start or continue.
    Error(String),
}

/// State of the renewal loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalState {
    /// Credential valid, no renewal activity yet.
    Active,
    /// A lease watch is running.
    Watching,
    /// A re-login is in progress.
    Reauthenticating,
    /// The loop has stopped.
    Terminated,
}

impl RenewalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenewalState::Active => "active",
            RenewalState::Watching => "watching",
            RenewalState::Reauthenticating => "reauthenticating",
            RenewalState::Terminated => "terminated",
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, RenewalState::Terminated)
    }
}

impl fmt::Display for RenewalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
