//! Trigger sources feeding the event merger.
//!
//! - [`PushSource`] - one subscription on the push event feed
//! - [`TimerSource`] - fixed-interval ticks

mod backoff;
mod push;
mod timer;

pub use backoff::ExponentialBackoff;
pub use push::{decode_event_type, PushSource, ReconnectPolicy};
pub use timer::TimerSource;
