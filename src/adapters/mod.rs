//! Concrete implementations of the collaborator traits.
//!
//! # Adapters
//!
//! - [`VaultClient`] - secret store over the Vault HTTP API
//! - [`DriveStorage`] - remote storage over the Drive REST API
//! - [`TungsteniteSubscriber`] - push event feed over a websocket
//! - [`WebhookNotifier`] - notifications as JSON POSTs
//!
//! # Mock Implementations
//!
//! The [`mock`] submodule provides test doubles for every trait.

pub mod drive_http;
pub mod mock;
pub mod tungstenite_feed;
pub mod vault_http;
pub mod webhook_notifier;

pub use drive_http::DriveStorage;
pub use tungstenite_feed::TungsteniteSubscriber;
pub use vault_http::VaultClient;
pub use webhook_notifier::WebhookNotifier;
