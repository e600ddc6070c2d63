//! Push trigger source.
//!
//! Owns one subscription on the secret store's event feed and turns each
//! decoded message into an event-driven [`Trigger`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::backoff::ExponentialBackoff;
use crate::credential::CredentialHandle;
use crate::error::{PushError, VaultBackupError};
use crate::merger::MergeSender;
use crate::traits::{EventStream, EventSubscriber};
use crate::trigger::Trigger;

/// Re-subscription policy after a lost connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts before giving up. Zero disables reconnection.
    pub max_attempts: u32,
    /// Upper bound of the backoff delay.
    pub max_backoff: Duration,
}

impl ReconnectPolicy {
    /// The first failure is terminal.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            max_backoff: Duration::from_secs(30),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

enum Reconnect {
    Connected(Box<dyn EventStream>),
    Cancelled,
    GaveUp,
}

/// Extract `data.event_type` from a feed message.
///
/// A message without the field yields an empty string. Anything that is not
/// JSON is a decode error.
pub fn decode_event_type(message: &str) -> Result<String, PushError> {
    let value: serde_json::Value =
        serde_json::from_str(message).map_err(|e| PushError::Decode(e.to_string()))?;
    Ok(value
        .pointer("/data/event_type")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string())
}

/// Long-lived push subscription feeding the merger.
pub struct PushSource {
    subscriber: Arc<dyn EventSubscriber>,
    credentials: CredentialHandle,
    sender: MergeSender<Trigger>,
    policy: ReconnectPolicy,
    stream: Box<dyn EventStream>,
}

impl PushSource {
    /// Open the subscription with the current credential.
    ///
    /// Failing here is a startup failure for the caller to classify.
    pub async fn connect(
        subscriber: Arc<dyn EventSubscriber>,
        credentials: CredentialHandle,
        sender: MergeSender<Trigger>,
        policy: ReconnectPolicy,
    ) -> Result<Self, PushError> {
        let credential = credentials
            .current()
            .ok_or_else(|| PushError::ConnectFailed("no credential installed".to_string()))?;
        let stream = subscriber.subscribe(&credential).await?;
        tracing::info!("push subscription opened");
        Ok(Self {
            subscriber,
            credentials,
            sender,
            policy,
            stream,
        })
    }

    /// Read until cancelled, the merger closes, or the subscription is lost
    /// for good.
    ///
    /// A lost subscription is returned as [`VaultBackupError::PushLost`].
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), VaultBackupError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.stream.close().await;
                    tracing::info!("push source stopped");
                    return Ok(());
                }
                next = self.stream.next_message() => next,
            };

            let failure = match next {
                Some(Ok(message)) => match decode_event_type(&message) {
                    Ok(event_type) => {
                        if !self.forward(Trigger::push(event_type), &cancel).await {
                            self.stream.close().await;
                            return Ok(());
                        }
                        continue;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "undecodable push event, stopping push source");
                        self.stream.close().await;
                        return Err(VaultBackupError::PushLost(e));
                    }
                },
                Some(Err(e)) => e,
                None => PushError::ConnectionLost("server ended the subscription".to_string()),
            };

            tracing::error!(error = %failure, "push subscription read failed");
            self.stream.close().await;

            match self.reconnect(&cancel).await {
                Reconnect::Connected(stream) => self.stream = stream,
                Reconnect::Cancelled => return Ok(()),
                Reconnect::GaveUp => return Err(VaultBackupError::PushLost(failure)),
            }
        }
    }

    /// Returns false when the source should stop.
    async fn forward(&self, trigger: Trigger, cancel: &CancellationToken) -> bool {
        tracing::info!(
            trigger = %trigger.source,
            event_type = trigger.event_type.as_deref().unwrap_or(""),
            "received push event"
        );
        tokio::select! {
            _ = cancel.cancelled() => false,
            sent = self.sender.send(trigger) => match sent {
                Ok(()) => true,
                Err(_) => {
                    tracing::warn!("merger closed, stopping push source");
                    false
                }
            },
        }
    }

    async fn reconnect(&self, cancel: &CancellationToken) -> Reconnect {
        if !self.policy.is_enabled() {
            return Reconnect::GaveUp;
        }

        let mut backoff = ExponentialBackoff::new(self.policy.max_backoff);
        for attempt in 1..=self.policy.max_attempts {
            let delay = backoff.next_delay();
            tracing::info!(
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_secs = delay.as_secs(),
                "re-subscribing to push feed"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Reconnect::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }

            let Some(credential) = self.credentials.current() else {
                tracing::warn!(attempt, "no credential installed, cannot re-subscribe");
                continue;
            };

            match self.subscriber.subscribe(&credential).await {
                Ok(stream) => {
                    tracing::info!(attempt, "push subscription re-opened");
                    return Reconnect::Connected(stream);
                }
                Err(e) => tracing::warn!(attempt, error = %e, "re-subscription failed"),
            }
        }

        tracing::error!(
            attempts = self.policy.max_attempts,
            "giving up on push subscription"
        );
        Reconnect::GaveUp
    }
}
