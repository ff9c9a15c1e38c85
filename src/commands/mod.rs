//! CLI command handlers.

mod fetch;
mod serve_mail;

pub use fetch::run_fetch_command;
pub use serve_mail::run_serve_mail_command;
