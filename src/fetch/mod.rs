//! Protocol adapters turning resource URLs into raw bytes.
//!
//! Each supported URL scheme maps to exactly one [`ProtocolAdapter`]. The
//! mapping lives in an [`AdapterRegistry`] and is consulted once, when a
//! [`Document`](crate::Document) is opened.
//!
//! # Architecture
//!
//! - [`ProtocolAdapter`] - Async trait implemented by every adapter
//! - [`LocalAdapter`] - `file://` URLs, read from the local filesystem
//! - [`ShareAdapter`] - `smb://` URLs, read through a [`ShareBackend`]
//! - [`MailboxAdapter`] - `imap://` / `imaps://` message URLs, read through a [`MailStore`]
//! - [`HttpAdapter`] - `http://` / `https://` URLs, read through a [`BoundedFetch`]
//!
//! | Prefix | Adapter |
//! |---|---|
//! | `file://` | Local |
//! | `smb://` | Share |
//! | `imap://`, `imaps://` | Mailbox |
//! | `http://`, `https://` | Http |

mod bounded;
mod http;
mod imap;
mod local;
mod mailbox;
mod share;

pub use bounded::{BoundedFetch, FetchOutcome, Transfer};
pub use http::HttpAdapter;
pub use imap::ImapStore;
pub use local::LocalAdapter;
pub use mailbox::{
    MAILBOX_FILE_EXTENSION, MailEndpoint, MailSession, MailStore, MailboxAdapter, MessageRef,
    sent_date,
};
pub use share::{MountedShare, ShareAdapter, ShareBackend, ShareEntry, ShareLocation};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::credentials::AccountPassword;
use crate::error::FetchError;

/// Readable view over document content; the caller owns (and closes) it.
pub type ContentStream = Box<dyn AsyncRead + Send + Unpin>;

/// URL scheme recognised by the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `file://`
    File,
    /// `smb://`
    Smb,
    /// `imap://`
    Imap,
    /// `imaps://`
    Imaps,
    /// `http://`
    Http,
    /// `https://`
    Https,
}

impl Scheme {
    const PREFIXES: [(&'static str, Self); 6] = [
        ("file://", Self::File),
        ("smb://", Self::Smb),
        ("imaps://", Self::Imaps),
        ("imap://", Self::Imap),
        ("https://", Self::Https),
        ("http://", Self::Http),
    ];

    /// Determines the scheme of `url` by case-insensitive prefix match.
    #[must_use]
    pub fn of(url: &str) -> Option<Self> {
        Self::PREFIXES.iter().find_map(|(prefix, scheme)| {
            url.get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .map(|_| *scheme)
        })
    }

    /// Returns the adapter kind serving this scheme.
    #[must_use]
    pub fn adapter_kind(self) -> AdapterKind {
        match self {
            Self::File => AdapterKind::Local,
            Self::Smb => AdapterKind::Share,
            Self::Imap | Self::Imaps => AdapterKind::Mailbox,
            Self::Http | Self::Https => AdapterKind::Http,
        }
    }

    /// Returns true for the TLS variants (`imaps`, `https`).
    #[must_use]
    pub fn is_secure(self) -> bool {
        matches!(self, Self::Imaps | Self::Https)
    }
}

/// The four adapter families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Local filesystem.
    Local,
    /// Authenticated network share.
    Share,
    /// Mailbox server.
    Mailbox,
    /// HTTP origin.
    Http,
}

impl AdapterKind {
    /// Number of adapter kinds.
    pub const COUNT: usize = 4;

    /// Every kind, in index order.
    pub const ALL: [Self; Self::COUNT] = [Self::Local, Self::Share, Self::Mailbox, Self::Http];

    /// Returns the stable label used in logs and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Share => "share",
            Self::Mailbox => "mailbox",
            Self::Http => "http",
        }
    }

    /// Dense index for per-kind tables.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Local => 0,
            Self::Share => 1,
            Self::Mailbox => 2,
            Self::Http => 3,
        }
    }
}

/// Per-document inputs to an adapter call.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    /// Credentials for share and mailbox access.
    pub credentials: Option<AccountPassword>,
    /// Overrides the adapter's HTTP budget for this document.
    pub http_timeout: Option<Duration>,
}

/// Fully loaded content plus its authoritative modification time, if any.
#[derive(Debug, Clone)]
pub struct Content {
    /// The raw bytes.
    pub bytes: Bytes,
    /// Set only by adapters that know the real modification time.
    pub last_modified: Option<DateTime<Utc>>,
}

impl Content {
    /// Content without a known modification time.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            last_modified: None,
        }
    }
}

/// Result of a successful adapter load.
#[derive(Debug, Clone)]
pub enum Loaded {
    /// The resource content.
    Content(Content),
    /// The resource moved; the target must be scheduled by the crawler.
    Redirect {
        /// The new location.
        target: String,
    },
}

/// Protocol-specific strategy translating a URL into bytes and metadata.
///
/// Only [`load`](Self::load) is mandatory; the cheap metadata paths default to
/// "unknown" so the document falls back to loading content.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync + fmt::Debug {
    /// Returns the adapter family (used for profiling and dispatch).
    fn kind(&self) -> AdapterKind;

    /// Returns true when content must be loaded while the document is opened.
    fn loads_eagerly(&self) -> bool {
        false
    }

    /// Loads the complete content of `url`.
    async fn load(&self, url: &str, ctx: &FetchContext) -> Result<Loaded, FetchError>;

    /// Returns the byte length without buffering the content, when possible.
    async fn length(&self, _url: &str, _ctx: &FetchContext) -> Result<Option<u64>, FetchError> {
        Ok(None)
    }

    /// Returns the authoritative modification time, when cheaply available.
    async fn last_modified(
        &self,
        _url: &str,
        _ctx: &FetchContext,
    ) -> Result<Option<DateTime<Utc>>, FetchError> {
        Ok(None)
    }

    /// Opens a fresh stream over the content without buffering it, when possible.
    async fn open_stream(
        &self,
        _url: &str,
        _ctx: &FetchContext,
    ) -> Result<Option<ContentStream>, FetchError> {
        Ok(None)
    }
}

/// Dispatch table mapping adapter kinds to their implementations.
#[derive(Debug, Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<AdapterKind, Arc<dyn ProtocolAdapter>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `adapter` for its kind, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn ProtocolAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Returns the adapter responsible for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::UnsupportedScheme`] when the scheme is unknown or
    /// no adapter of the matching kind is registered.
    pub fn adapter_for(&self, url: &str) -> Result<Arc<dyn ProtocolAdapter>, FetchError> {
        Scheme::of(url)
            .and_then(|scheme| self.adapters.get(&scheme.adapter_kind()))
            .cloned()
            .ok_or_else(|| FetchError::unsupported_scheme(url))
    }

    /// Returns the number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Returns true when no adapter is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Largest buffer reserved up front from a length announced by a peer.
const MAX_PREALLOCATION: usize = 1024 * 1024;

/// Initial buffer capacity for content announced as `declared` bytes long.
///
/// Announced lengths are untrusted; beyond [`MAX_PREALLOCATION`] the buffer
/// grows with the data actually received.
pub(crate) fn initial_capacity(declared: Option<u64>) -> usize {
    declared
        .and_then(|len| usize::try_from(len).ok())
        .map_or(0, |len| len.min(MAX_PREALLOCATION))
}

/// Reads a stream to its end, pre-sizing the buffer with `size_hint`.
pub(crate) async fn read_to_bytes<R>(
    mut reader: R,
    size_hint: Option<u64>,
) -> std::io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(initial_capacity(size_hint));
    reader.read_to_end(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}
