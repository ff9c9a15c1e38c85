//! Crawl Fetch Library
//!
//! Fetches crawl documents from local files, mounted network shares, IMAP
//! mailboxes and HTTP origins, and materializes their content on demand as
//! bytes, text, a stream or a file on disk.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`document`] - Document facade, materialization states and disposal
//! - [`fetch`] - Protocol adapters and the bounded HTTP fetch
//! - [`credentials`] - Account/password pairs and URL credential injection
//! - [`profiler`] - Load measurements per adapter kind
//! - [`mail_endpoint`] - HTTP endpoint serving single mailbox messages
//! - [`config`] - Runtime configuration
//! - [`error`] - Error types and failure classification

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod credentials;
pub mod document;
pub mod error;
pub mod fetch;
pub mod mail_endpoint;
pub mod profiler;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, FetchConfig, FolderSeparator};
pub use credentials::{AccountPassword, inject_credentials};
pub use document::{
    BackingFile, DisposalManager, Document, DocumentRequest, Fetcher, Retrieval, StateKind,
};
pub use error::{FailureKind, FetchError, SetupError};
pub use fetch::{
    AdapterKind, BoundedFetch, ContentStream, FetchOutcome, HttpAdapter, LocalAdapter,
    MailboxAdapter, MessageRef, ProtocolAdapter, Scheme, ShareAdapter,
};
pub use profiler::{KindSummary, Measurement, MeasurementSink, ProfileStats, TracingSink};
