//! Trait abstractions for the external collaborators.
//!
//! The orchestration core only talks to the outside world through these
//! seams, so every component can be driven by the mocks in
//! `crate::adapters::mock`.
//!
//! # Traits
//!
//! - [`SecretStore`] - login, lease watching and snapshots
//! - [`RemoteStorage`] - list, upload and delete remote backups
//! - [`EventSubscriber`] / [`EventStream`] - the push event feed
//! - [`Notifier`] - optional outbound notifications

pub mod event_feed;
pub mod notifier;
pub mod remote_storage;
pub mod secret_store;

pub use event_feed::{EventStream, EventSubscriber};
pub use notifier::{NoopNotifier, Notifier};
pub use remote_storage::{EntryKind, RemoteEntry, RemoteStorage};
pub use secret_store::{LeaseWatch, RoleCredentials, SecretStore, SnapshotArtifact};
