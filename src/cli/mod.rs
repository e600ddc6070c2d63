//! CLI module.
//!
//! `main` parses the arguments first; only [`CliCommand::Run`] starts the
//! orchestrator.
//!
//! ```ignore
//! match parse_args(std::env::args()) {
//!     CliCommand::Run { config } => { /* start the orchestrator */ }
//!     other => run_cli_command(other),
//! }
//! ```

pub mod args;
pub mod version;

pub use args::{parse_args, usage, CliCommand, DEFAULT_CONFIG_PATH};
pub use version::{handle_version_command, VERSION};

/// Handle the commands that do not start the orchestrator.
///
/// Returns `true` when the command was handled.
pub fn run_cli_command(command: &CliCommand) -> bool {
    match command {
        CliCommand::Version => {
            handle_version_command();
            true
        }
        CliCommand::Help => {
            print!("{}", usage());
            true
        }
        CliCommand::Run { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_is_not_handled_here() {
        let command = CliCommand::Run {
            config: DEFAULT_CONFIG_PATH.into(),
        };
        assert!(!run_cli_command(&command));
    }
}
