//! Push event feed trait abstraction.

use async_trait::async_trait;

use crate::credential::Credential;
use crate::error::PushError;

/// Opens subscriptions on the secret store's event feed.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Open a long-lived subscription authenticated with `credential`.
    async fn subscribe(&self, credential: &Credential) -> Result<Box<dyn EventStream>, PushError>;
}

/// One open subscription. Owned by exactly one push source.
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Wait for the next raw message.
    ///
    /// `None` means the server ended the stream.
    async fn next_message(&mut self) -> Option<Result<String, PushError>>;

    /// Close the underlying connection.
    async fn close(&mut self);
}
