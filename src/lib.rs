//! vault-backup - snapshot a Vault cluster on events and on a schedule
//!
//! This library exposes modules for use in integration tests.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod credential;
pub mod error;
pub mod logging;
pub mod merger;
pub mod orchestrator;
pub mod pipeline;
pub mod renewal;
pub mod retention;
pub mod sources;
pub mod status;
pub mod traits;
pub mod trigger;
