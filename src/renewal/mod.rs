//! Credential renewal loop.
//!
//! Keeps the installed credential alive for the whole process lifetime.
//!
//! ```text
//!            start / new credential installed
//!   Active ─────────────────────────────► Watching ◄──┐ Renewed
//!                                            │  └─────┘
//!                              Expiring/Error│
//!                                            ▼
//!                                    Reauthenticating
//!                                  ok │           │ login failed
//!                       (to Watching) ┘           ▼
//!                                             Terminated ◄── cancel (any state)
//! ```
//!
//! A renewal only refreshes the lease metadata of the installed credential.
//! A re-login installs a brand new credential, and the old one stays
//! installed until the new one is ready.

mod lifecycle;
mod types;

pub use lifecycle::RenewalLoop;
pub use types::{RenewalOutcome, RenewalState};
