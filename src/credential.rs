//! The current secret-store credential and its lease status.
//!
//! The renewal loop owns the only [`CredentialInstaller`]; every other
//! component holds a cloneable [`CredentialHandle`]. Both sides share a
//! `tokio::sync::watch` slot, so readers always get a complete snapshot and
//! never see a half-written credential.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Authentication material with a renewable lease.
///
/// Immutable once issued. A re-login produces a new `Credential`; lease
/// renewals only touch the [`LeaseStatus`] stored next to it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    accessor: Option<String>,
    lease_duration: Duration,
    renewable: bool,
    issued_at: DateTime<Utc>,
}

impl Credential {
    /// Create a credential issued now.
    pub fn new(token: impl Into<String>, lease_duration: Duration, renewable: bool) -> Self {
        Self {
            token: token.into(),
            accessor: None,
            lease_duration,
            renewable,
            issued_at: Utc::now(),
        }
    }

    /// Attach the token accessor reported by the secret store.
    pub fn with_accessor(mut self, accessor: impl Into<String>) -> Self {
        self.accessor = Some(accessor.into());
        self
    }

    /// The opaque token sent with authenticated requests.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Token accessor, safe to log.
    pub fn accessor(&self) -> Option<&str> {
        self.accessor.as_deref()
    }

    /// Lease duration granted at login.
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Whether the lease can be extended in place.
    pub fn is_renewable(&self) -> bool {
        self.renewable
    }

    /// When the credential was issued.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("accessor", &self.accessor)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Remaining lease of the installed credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeaseStatus {
    /// Lease time remaining as of `refreshed_at`.
    #[serde(with = "duration_secs")]
    pub remaining: Duration,
    /// When this status was recorded.
    pub refreshed_at: DateTime<Utc>,
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}

#[derive(Debug, Clone)]
struct Slot {
    credential: Option<Arc<Credential>>,
    lease: Option<LeaseStatus>,
    generation: u64,
}

/// Write side of the credential slot. Owned by the renewal loop.
#[derive(Debug)]
pub struct CredentialInstaller {
    tx: watch::Sender<Slot>,
}

/// Read side of the credential slot.
#[derive(Debug, Clone)]
pub struct CredentialHandle {
    rx: watch::Receiver<Slot>,
}

/// Create a slot holding `initial` as generation 1.
pub fn credential_slot(initial: Credential) -> (CredentialInstaller, CredentialHandle) {
    let lease = LeaseStatus {
        remaining: initial.lease_duration,
        refreshed_at: Utc::now(),
    };
    let (tx, rx) = watch::channel(Slot {
        credential: Some(Arc::new(initial)),
        lease: Some(lease),
        generation: 1,
    });
    (CredentialInstaller { tx }, CredentialHandle { rx })
}

impl CredentialInstaller {
    /// Atomically replace the current credential. Returns the installed one.
    pub fn install(&self, credential: Credential) -> Arc<Credential> {
        let credential = Arc::new(credential);
        let installed = Arc::clone(&credential);
        self.tx.send_modify(|slot| {
            slot.lease = Some(LeaseStatus {
                remaining: credential.lease_duration,
                refreshed_at: Utc::now(),
            });
            slot.credential = Some(credential);
            slot.generation += 1;
        });
        installed
    }

    /// Record a successful in-place renewal. The credential itself is kept.
    pub fn refresh_lease(&self, remaining: Duration) {
        self.tx.send_modify(|slot| {
            if slot.credential.is_some() {
                slot.lease = Some(LeaseStatus {
                    remaining,
                    refreshed_at: Utc::now(),
                });
            }
        });
    }

    /// Withdraw the current credential. Readers get `None` from now on.
    pub fn revoke(&self) {
        self.tx.send_modify(|slot| {
            slot.credential = None;
            slot.lease = None;
        });
    }

    /// The installed credential.
    pub fn current(&self) -> Option<Arc<Credential>> {
        self.tx.borrow().credential.clone()
    }

    /// A new read handle on this slot.
    pub fn handle(&self) -> CredentialHandle {
        CredentialHandle {
            rx: self.tx.subscribe(),
        }
    }
}

impl CredentialHandle {
    /// The most recently installed credential, or `None` once revoked.
    pub fn current(&self) -> Option<Arc<Credential>> {
        self.rx.borrow().credential.clone()
    }

    /// Lease status of the current credential.
    pub fn lease(&self) -> Option<LeaseStatus> {
        self.rx.borrow().lease
    }

    /// Number of credentials installed so far, the initial login included.
    pub fn generation(&self) -> u64 {
        self.rx.borrow().generation
    }

    /// Whether the credential was revoked.
    pub fn is_revoked(&self) -> bool {
        self.rx.borrow().credential.is_none()
    }
}
