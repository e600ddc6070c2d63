//! Command-line argument parsing.

use std::path::PathBuf;

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Parsed CLI command to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Run the backup orchestrator (default)
    Run { config: PathBuf },
    /// Show version information
    Version,
    /// Show usage
    Help,
}

/// Parse command-line arguments and return the command to execute.
///
/// # Examples
///
/// ```
/// use vault_backup::cli::args::{parse_args, CliCommand};
///
/// let args = vec!["vault-backup".to_string(), "--version".to_string()];
/// assert_eq!(parse_args(args.into_iter()), CliCommand::Version);
/// ```
pub fn parse_args<I>(args: I) -> CliCommand
where
    I: Iterator<Item = String>,
{
    let mut config = PathBuf::from(DEFAULT_CONFIG_PATH);
    // Skip the program name
    let mut args = args.skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => return CliCommand::Version,
            "--help" | "-h" => return CliCommand::Help,
            "--config" | "-c" => match args.next() {
                Some(path) => config = PathBuf::from(path),
                None => return CliCommand::Help,
            },
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    config = PathBuf::from(path);
                }
            }
        }
    }
    CliCommand::Run { config }
}

/// Usage text for `--help`.
pub fn usage() -> String {
    format!(
        "vault-backup {}\n\n\
         Usage: vault-backup [--config <path>]\n\n\
         Options:\n  \
         -c, --config <path>  configuration file (default: {})\n  \
         -V, --version        print version\n  \
         -h, --help           print this help\n\n\
         Environment:\n  \
         VAULT_ADDR           overrides vault.address\n  \
         APPROLE_SECRET_ID    AppRole secret id (required)\n  \
         DRIVE_ACCESS_TOKEN   storage access token\n  \
         RUST_LOG             log filter, overrides logging.level\n",
        super::version::VERSION,
        DEFAULT_CONFIG_PATH
    )
}
