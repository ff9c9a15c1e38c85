//! `smb://` adapter reading from an authenticated network share.
//!
//! The share protocol itself sits behind [`ShareBackend`]. The bundled
//! [`MountedShare`] backend reads shares mounted under a local directory
//! (`<mount_root>/<host>/<share>/<path>`), which is how crawl hosts usually
//! reach CIFS shares.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};
use url::Url;

use super::{
    AdapterKind, Content, ContentStream, FetchContext, Loaded, ProtocolAdapter, read_to_bytes,
};
use crate::credentials::{AccountPassword, inject_credentials};
use crate::error::FetchError;

/// A file on a share, decoded from an `smb://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLocation {
    /// Server name.
    pub host: String,
    /// Percent-decoded path starting with the share name (`/share/dir/file`).
    pub path: String,
    /// Userinfo carried by the URL after credential injection.
    pub credentials: Option<AccountPassword>,
}

impl ShareLocation {
    /// Parses an `smb://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::MalformedReference`] when the URL has no host.
    pub fn parse(url: &str) -> Result<Self, FetchError> {
        let parsed =
            Url::parse(url).map_err(|e| FetchError::malformed(url, format!("invalid URL: {e}")))?;
        let host = parsed
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| FetchError::malformed(url, "share URL has no host"))?
            .to_string();
        let path = urlencoding::decode(parsed.path())
            .map_err(|e| FetchError::malformed(url, format!("invalid path encoding: {e}")))?
            .into_owned();
        let credentials = (!parsed.username().is_empty()).then(|| {
            let decode = |raw: &str| {
                urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |v| v.into_owned())
            };
            AccountPassword::new(
                decode(parsed.username()),
                decode(parsed.password().unwrap_or_default()),
            )
        });
        Ok(Self {
            host,
            path,
            credentials,
        })
    }
}

/// Metadata of a share entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareEntry {
    /// Content length in bytes.
    pub len: u64,
    /// True for directories.
    pub is_dir: bool,
    /// Modification time reported by the share.
    pub modified: Option<DateTime<Utc>>,
}

/// Access to files on network shares.
#[async_trait]
pub trait ShareBackend: Send + Sync + fmt::Debug {
    /// Returns metadata for `location`.
    async fn stat(&self, location: &ShareLocation) -> std::io::Result<ShareEntry>;

    /// Opens a fresh read handle for `location`.
    async fn open(&self, location: &ShareLocation) -> std::io::Result<ContentStream>;
}

/// Backend reading shares mounted below a local directory.
///
/// A mount authenticates once, with the account it was made for. Documents
/// carrying credentials are read through that account's mount,
/// `<root>/<account>@<host>`, when it exists; otherwise through the host
/// mount `<root>/<host>`.
#[derive(Debug, Clone)]
pub struct MountedShare {
    root: PathBuf,
}

impl MountedShare {
    /// Creates a backend rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Maps a share location to its path below the mount root.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for paths, hosts or account names escaping the
    /// mount root.
    pub async fn resolve(&self, location: &ShareLocation) -> std::io::Result<PathBuf> {
        let relative = Path::new(location.path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || !is_plain_name(&location.host) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("share path escapes mount root: {}", location.path),
            ));
        }
        Ok(self.mount_dir(location).await?.join(relative))
    }

    async fn mount_dir(&self, location: &ShareLocation) -> std::io::Result<PathBuf> {
        let host_mount = self.root.join(&location.host);
        let Some(credentials) = &location.credentials else {
            return Ok(host_mount);
        };
        let account = credentials.account_name();
        if !is_plain_name(account) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("share account name is not a valid mount name: {account}"),
            ));
        }
        let account_mount = self.root.join(format!("{account}@{}", location.host));
        if tokio::fs::try_exists(&account_mount).await.unwrap_or(false) {
            debug!(host = %location.host, account, "reading through account mount");
            return Ok(account_mount);
        }
        warn!(
            host = %location.host,
            account,
            "no mount for share account, reading through host mount"
        );
        Ok(host_mount)
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

#[async_trait]
impl ShareBackend for MountedShare {
    async fn stat(&self, location: &ShareLocation) -> std::io::Result<ShareEntry> {
        let path = self.resolve(location).await?;
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(ShareEntry {
            len: metadata.len(),
            is_dir: metadata.is_dir(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    async fn open(&self, location: &ShareLocation) -> std::io::Result<ContentStream> {
        let path = self.resolve(location).await?;
        let file = tokio::fs::File::open(&path).await?;
        Ok(Box::new(file))
    }
}

/// Adapter for `smb://` URLs.
#[derive(Debug, Clone)]
pub struct ShareAdapter {
    backend: Arc<dyn ShareBackend>,
}

impl ShareAdapter {
    /// Creates an adapter on top of `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn ShareBackend>) -> Self {
        Self { backend }
    }

    fn locate(url: &str, ctx: &FetchContext) -> Result<ShareLocation, FetchError> {
        let authenticated = inject_credentials(url, ctx.credentials.as_ref());
        // Errors must name the URL as given, never the one with injected secrets.
        ShareLocation::parse(&authenticated).map_err(|_| {
            FetchError::malformed(url, "share URL must look like smb://host/share/path")
        })
    }

    async fn stat_file(
        &self,
        url: &str,
        location: &ShareLocation,
    ) -> Result<ShareEntry, FetchError> {
        let entry = self
            .backend
            .stat(location)
            .await
            .map_err(|e| FetchError::unavailable_with(url, "cannot stat share file", e))?;
        if entry.is_dir {
            return Err(FetchError::unavailable(url, "share path is a directory"));
        }
        Ok(entry)
    }
}

#[async_trait]
impl ProtocolAdapter for ShareAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Share
    }

    #[instrument(skip(self, ctx), fields(adapter = "share"))]
    async fn load(&self, url: &str, ctx: &FetchContext) -> Result<Loaded, FetchError> {
        let location = Self::locate(url, ctx)?;
        let entry = self.stat_file(url, &location).await?;
        let stream = self
            .backend
            .open(&location)
            .await
            .map_err(|e| FetchError::unavailable_with(url, "cannot open share file", e))?;
        let bytes = read_to_bytes(stream, Some(entry.len))
            .await
            .map_err(|e| FetchError::unavailable_with(url, "cannot read share file", e))?;
        debug!(host = %location.host, bytes = bytes.len(), "read share file");
        Ok(Loaded::Content(Content {
            bytes,
            last_modified: entry.modified,
        }))
    }

    async fn length(&self, url: &str, ctx: &FetchContext) -> Result<Option<u64>, FetchError> {
        let location = Self::locate(url, ctx)?;
        Ok(Some(self.stat_file(url, &location).await?.len))
    }

    async fn open_stream(
        &self,
        url: &str,
        ctx: &FetchContext,
    ) -> Result<Option<ContentStream>, FetchError> {
        let location = Self::locate(url, ctx)?;
        self.stat_file(url, &location).await?;
        let stream = self
            .backend
            .open(&location)
            .await
            .map_err(|e| FetchError::unavailable_with(url, "cannot open share file", e))?;
        Ok(Some(stream))
    }
}
