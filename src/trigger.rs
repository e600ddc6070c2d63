//! Trigger events: "a backup should happen now, deploy it there".

use std::fmt;

use serde::Serialize;

/// Which producer emitted a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// An event pushed by the secret store's event feed.
    Push,
    /// A tick of the fixed-interval timer.
    Scheduled,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Push => write!(f, "push"),
            TriggerSource::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// Destination identifier carried by a trigger.
///
/// Resolved to a concrete remote folder by [`DeployTargets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// The event-driven deploy target.
    EventDriven,
    /// The scheduled deploy target.
    Scheduled,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::EventDriven => write!(f, "event-driven deploy target"),
            Destination::Scheduled => write!(f, "scheduled deploy target"),
        }
    }
}

/// One request for a backup. Consumed exactly once by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub source: TriggerSource,
    pub destination: Destination,
    /// Event type reported by the push feed, if any.
    pub event_type: Option<String>,
}

impl Trigger {
    /// A trigger from the push feed.
    pub fn push(event_type: impl Into<String>) -> Self {
        let event_type = event_type.into();
        Self {
            source: TriggerSource::Push,
            destination: Destination::EventDriven,
            event_type: (!event_type.is_empty()).then_some(event_type),
        }
    }

    /// A trigger from the timer.
    pub fn scheduled() -> Self {
        Self {
            source: TriggerSource::Scheduled,
            destination: Destination::Scheduled,
            event_type: None,
        }
    }
}

/// Remote folder ids for each destination identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTargets {
    pub event_driven: String,
    pub scheduled: String,
}

impl DeployTargets {
    pub fn new(event_driven: impl Into<String>, scheduled: impl Into<String>) -> Self {
        Self {
            event_driven: event_driven.into(),
            scheduled: scheduled.into(),
        }
    }

    /// The remote folder for `destination`.
    pub fn resolve(&self, destination: Destination) -> &str {
        match destination {
            Destination::EventDriven => &self.event_driven,
            Destination::Scheduled => &self.scheduled,
        }
    }
}
