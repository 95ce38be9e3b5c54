//! Command line entry point for the appointment watcher.
//! Runs a single check or watches the booking page until stopped.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use appointment_scan::{CheckStatus, WatchConfig, stable_json};
use clap::{Parser, Subcommand};

mod watch_manager;
use watch_manager::WatchManager;

/// Terminland appointment watcher
#[derive(Debug, Parser)]
#[command(name = "appointment-watcher", version)]
struct Cli {
    /// Path to config.yaml
    #[arg(long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a single check and print it as JSON
    CheckOnce {
        /// Persist the result and send notifications
        #[arg(long)]
        store: bool,
    },
    /// Run forever with scheduling
    Run,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = WatchConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    let manager = WatchManager::new(config);

    if std::env::var("TEST_EMAIL").as_deref() == Ok("1") {
        manager.send_test_email().await?;
        return Ok(ExitCode::SUCCESS);
    }

    match cli.command {
        Command::CheckOnce { store } => {
            let executor = manager.executor(store).await?;
            let result = if store {
                executor.run_once_and_store().await?
            } else {
                executor.run_once().await
            };

            println!("{}", stable_json(&result)?);
            Ok(ExitCode::from(exit_code_for(result.status)))
        }
        Command::Run => {
            log::info!("Starting appointment watcher");
            let executor = manager.executor(true).await?;
            executor.start().await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code_for(status: CheckStatus) -> u8 {
    match status {
        CheckStatus::Blocked => 2,
        CheckStatus::Error => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_once() {
        let cli = Cli::try_parse_from([
            "appointment-watcher",
            "--config",
            "config.yaml",
            "check-once",
            "--store",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert!(matches!(cli.command, Command::CheckOnce { store: true }));
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["appointment-watcher", "--config", "c.yaml", "run"]).unwrap();
        assert!(matches!(cli.command, Command::Run));
    }

    #[test]
    fn test_config_is_required() {
        assert!(Cli::try_parse_from(["appointment-watcher", "run"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(CheckStatus::Available), 0);
        assert_eq!(exit_code_for(CheckStatus::Unavailable), 0);
        assert_eq!(exit_code_for(CheckStatus::Error), 1);
        assert_eq!(exit_code_for(CheckStatus::Blocked), 2);
    }
}
