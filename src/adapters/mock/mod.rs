//! Mock implementations for testing.
//!
//! Every collaborator seam has a mock here so the components can be driven
//! without a secret store, remote storage or network.
//!
//! # Available Mocks
//!
//! - [`MockSecretStore`] - scripted logins and lease watches
//! - [`MockStorage`] - in-memory entries with scripted failures
//! - [`MockEventSubscriber`] - push messages injected through [`MockFeed`]
//! - [`RecordingNotifier`] - records notifications

pub mod event_feed;
pub mod notifier;
pub mod secret_store;
pub mod storage;

pub use event_feed::{MockEventSubscriber, MockFeed};
pub use notifier::RecordingNotifier;
pub use secret_store::{MockSecretStore, RecordedSnapshot, MOCK_SNAPSHOT_BYTES};
pub use storage::{MockStorage, RecordedUpload};
