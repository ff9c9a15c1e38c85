//! CLI argument definitions using clap derive macros.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crawl_fetch::{AccountPassword, FolderSeparator};

/// Default listen address of the mail endpoint.
pub const DEFAULT_MAIL_BIND: &str = "127.0.0.1:8025";

/// Fetch and materialize crawl documents.
///
/// Reads documents from file://, smb://, imap(s):// and http(s):// URLs the
/// way the crawler does, and can serve mailbox messages over HTTP.
#[derive(Parser, Debug)]
#[command(name = "crawl-fetch")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Read settings from this file instead of the default config path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch each URL and print its outcome, length and modification time
    Fetch(FetchArgs),
    /// Serve mailbox messages as message/rfc822 behind Basic auth
    ServeMail(ServeMailArgs),
}

/// Arguments of `crawl-fetch fetch`.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Document URLs to fetch
    #[arg(required = true, num_args = 1..)]
    pub urls: Vec<String>,

    /// Print one JSON object per URL instead of text lines
    #[arg(long)]
    pub json: bool,

    /// HTTP fetch budget in seconds (1-3600), overriding the configured value
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Account for share and mailbox URLs, as user:password
    #[arg(long, value_name = "USER:PASSWORD", value_parser = parse_credentials)]
    pub credentials: Option<AccountPassword>,

    /// Mailbox folder separator (slash or dot)
    #[arg(long, value_parser = parse_separator)]
    pub folder_separator: Option<FolderSeparator>,

    /// Print per-adapter load counters to stderr when done
    #[arg(long)]
    pub stats: bool,
}

/// Arguments of `crawl-fetch serve-mail`.
#[derive(Args, Debug)]
pub struct ServeMailArgs {
    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_MAIL_BIND)]
    pub bind: SocketAddr,
}

fn parse_credentials(raw: &str) -> Result<AccountPassword, String> {
    AccountPassword::from_basic_pair(raw)
        .ok_or_else(|| "expected USER:PASSWORD with a non-empty user".to_string())
}

fn parse_separator(raw: &str) -> Result<FolderSeparator, String> {
    FolderSeparator::parse(raw).ok_or_else(|| format!("unknown separator '{raw}': use slash or dot"))
}
