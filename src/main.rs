//! CLI entry point for the crawl-fetch tool.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod app_config;
mod cli;
mod commands;

use app_config::VerbositySetting;
use cli::{Cli, Command};

/// Process outcome mapped to the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every URL succeeded (redirects count as success).
    Success,
    /// Some URLs failed.
    Partial,
    /// Every URL failed.
    Failure,
}

impl ProcessExit {
    fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Partial => 1,
            Self::Failure => 2,
        }
    }
}

/// Determines the process exit outcome from completed and failed counts.
pub(crate) fn determine_exit_outcome(completed: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

/// Picks the default log level.
///
/// Priority: quiet flag > verbose flag > config file verbosity > info.
/// `RUST_LOG` still overrides the result in [`init_tracing`].
fn resolve_default_log_level(
    quiet: bool,
    verbose: u8,
    configured: Option<VerbositySetting>,
) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => configured.map_or("info", VerbositySetting::log_level),
        1 => "debug",
        _ => "trace",
    }
}

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();
    let loaded = app_config::load_config(cli.config.as_deref())?;

    init_tracing(resolve_default_log_level(
        cli.quiet,
        cli.verbose,
        loaded.config.verbosity,
    ));
    debug!(?cli, "CLI arguments parsed");
    debug!(
        path = ?loaded.path,
        loaded = loaded.loaded_from_file,
        "configuration resolved"
    );

    let config = loaded.config.to_fetch_config();
    let exit = match &cli.command {
        Command::Fetch(args) => commands::run_fetch_command(args, config).await?,
        Command::ServeMail(args) => {
            commands::run_serve_mail_command(args, config).await?;
            ProcessExit::Success
        }
    };
    Ok(ExitCode::from(exit.code()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_outcome_success_when_no_failures() {
        assert_eq!(determine_exit_outcome(3, 0), ProcessExit::Success);
        assert_eq!(determine_exit_outcome(0, 0), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_partial_when_mixed() {
        assert_eq!(determine_exit_outcome(2, 1), ProcessExit::Partial);
        assert_eq!(ProcessExit::Partial.code(), 1);
    }

    #[test]
    fn test_exit_outcome_failure_when_all_failed() {
        assert_eq!(determine_exit_outcome(0, 2), ProcessExit::Failure);
        assert_eq!(ProcessExit::Failure.code(), 2);
    }

    #[test]
    fn test_log_level_priority() {
        assert_eq!(resolve_default_log_level(true, 2, None), "error");
        assert_eq!(resolve_default_log_level(false, 1, None), "debug");
        assert_eq!(resolve_default_log_level(false, 2, None), "trace");
        assert_eq!(resolve_default_log_level(false, 0, None), "info");
        assert_eq!(
            resolve_default_log_level(false, 0, Some(VerbositySetting::Quiet)),
            "error"
        );
    }
}
