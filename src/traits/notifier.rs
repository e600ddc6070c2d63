//! Outbound notification trait abstraction.

use async_trait::async_trait;

use crate::error::NotifyError;

/// Trait for sending operator notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Notifier used when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, subject: &str, _body: &str) -> Result<(), NotifyError> {
        tracing::debug!(subject, "no notifier configured, dropping notification");
        Ok(())
    }
}
