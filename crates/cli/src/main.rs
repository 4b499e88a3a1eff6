//! Sentient CLI, the main entry point.
//!
//! Commands:
//! - `run`       Work on a goal, or resume a session
//! - `sessions`  List stored sessions
//! - `show`      Print a session's history
//! - `delete`    Remove a session
//! - `onboard`   Write the default config file
//! - `config`    Print the effective configuration
//! - `doctor`    Check config, store and provider

use clap::{Parser, Subcommand};
use sentient_config::{AppConfig, LogConfig};
use std::process::ExitCode;

mod commands;
mod progress;

#[derive(Parser)]
#[command(
    name = "sentient",
    about = "Sentient: an autonomous shell agent with durable sessions",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Work on a goal until it is done
    Run {
        /// The task. With --session or --continue it is sent as a follow-up prompt.
        goal: Option<String>,

        /// Resume the session with this id
        #[arg(short, long, conflicts_with = "continue_latest")]
        session: Option<String>,

        /// Resume the most recently updated session
        #[arg(short = 'c', long = "continue")]
        continue_latest: bool,
    },

    /// List stored sessions, newest first
    Sessions {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Print the history of a session
    Show { id: String },

    /// Delete a session and its messages
    Delete { id: String },

    /// Write a default config file
    Onboard,

    /// Print the effective configuration with secrets redacted
    Config {
        /// Print only the config file path
        #[arg(long)]
        path: bool,
    },

    /// Check config, session store and provider connectivity
    Doctor,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Commands that must work without a valid config.
    match &cli.command {
        Commands::Onboard => return report(commands::onboard::run()),
        Commands::Config { path: true } => {
            println!("{}", AppConfig::config_dir().join("config.toml").display());
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(cli.verbose, &config.log);

    let result = match cli.command {
        Commands::Run {
            goal,
            session,
            continue_latest,
        } => commands::run::run(&config, goal, session, continue_latest).await,
        Commands::Sessions { limit } => commands::sessions::list(&config, limit).await.map(|()| true),
        Commands::Show { id } => commands::sessions::show(&config, &id).await.map(|()| true),
        Commands::Delete { id } => commands::sessions::delete(&config, &id).await,
        Commands::Config { .. } => commands::config_cmd::show(&config).map(|()| true),
        Commands::Doctor => commands::doctor::run(&config).await,
        Commands::Onboard => commands::onboard::run().map(|()| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn report(result: Result<(), Box<dyn std::error::Error>>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool, log: &LogConfig) {
    let default_filter = if verbose { "debug" } else { log.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if log.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_continue_flag() {
        let cli = Cli::try_parse_from(["sentient", "run", "--continue", "and now the tests"]).unwrap();
        match cli.command {
            Commands::Run {
                goal,
                session,
                continue_latest,
            } => {
                assert_eq!(goal.as_deref(), Some("and now the tests"));
                assert!(session.is_none());
                assert!(continue_latest);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn session_and_continue_conflict() {
        assert!(Cli::try_parse_from(["sentient", "run", "--session", "abc", "--continue"]).is_err());
    }
}
