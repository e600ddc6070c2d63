//! Fixed-interval trigger source.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::VaultBackupError;
use crate::merger::MergeSender;
use crate::trigger::Trigger;

/// Emits a scheduled trigger on start and then once per interval.
pub struct TimerSource {
    interval: Duration,
    sender: MergeSender<Trigger>,
}

impl TimerSource {
    /// Fails with [`VaultBackupError::Scheduler`] for a zero interval.
    pub fn new(interval: Duration, sender: MergeSender<Trigger>) -> Result<Self, VaultBackupError> {
        if interval.is_zero() {
            return Err(VaultBackupError::Scheduler(
                "scheduled snapshot interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self { interval, sender })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = %humantime::format_duration(self.interval), "timer source started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tracing::info!(trigger = "scheduled", "scheduled snapshot due");
            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = self.sender.send(Trigger::scheduled()) => {
                    if sent.is_err() {
                        tracing::warn!("merger closed, stopping timer source");
                        break;
                    }
                }
            }
        }

        tracing::info!("timer source stopped");
    }
}
