use vault_backup::cli::{parse_args, run_cli_command, CliCommand};
use vault_backup::config::AppConfig;
use vault_backup::error::VaultBackupError;
use vault_backup::logging;
use vault_backup::orchestrator::run_from_config;

use color_eyre::Result;
use tokio_util::sync::CancellationToken;

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "unable to listen for SIGTERM");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        tracing::info!("signal received, shutting down");
        shutdown.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config_path = match parse_args(std::env::args()) {
        CliCommand::Run { config } => config,
        other => {
            run_cli_command(&other);
            return Ok(());
        }
    };

    // Logging is not up yet, so configuration errors go to stderr.
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            let err = VaultBackupError::from(e);
            eprintln!("vault-backup: {}", err);
            std::process::exit(err.exit_code());
        }
    };

    let guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("vault-backup: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    tracing::info!(
        version = vault_backup::cli::VERSION,
        config = %config_path.display(),
        "vault-backup starting"
    );

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let result = run_from_config(config, shutdown).await;

    // Flush buffered log lines before a possible exit.
    drop(guard);
    if let Err(e) = result {
        std::process::exit(e.exit_code());
    }
    Ok(())
}
