//! `file://` adapter reading from the local filesystem.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use url::Url;

use super::{AdapterKind, Content, ContentStream, FetchContext, Loaded, ProtocolAdapter};
use crate::error::FetchError;

/// Adapter for `file://` URLs.
///
/// Length and modification time come from a `stat`, so neither requires the
/// content to be read.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalAdapter;

impl LocalAdapter {
    /// Creates a new `LocalAdapter`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Maps a `file://` URL to a filesystem path.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::MalformedReference`] when the URL does not
    /// describe an absolute local path.
    pub fn url_to_path(url: &str) -> Result<PathBuf, FetchError> {
        let parsed =
            Url::parse(url).map_err(|e| FetchError::malformed(url, format!("invalid URL: {e}")))?;
        parsed
            .to_file_path()
            .map_err(|()| FetchError::malformed(url, "not a local file path"))
    }

    async fn metadata(url: &str) -> Result<(PathBuf, std::fs::Metadata), FetchError> {
        let path = Self::url_to_path(url)?;
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            FetchError::unavailable_with(url, format!("cannot stat {}", path.display()), e)
        })?;
        if metadata.is_dir() {
            return Err(FetchError::unavailable(
                url,
                format!("{} is a directory", path.display()),
            ));
        }
        Ok((path, metadata))
    }
}

#[async_trait]
impl ProtocolAdapter for LocalAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Local
    }

    #[instrument(skip(self, _ctx), fields(adapter = "local"))]
    async fn load(&self, url: &str, _ctx: &FetchContext) -> Result<Loaded, FetchError> {
        let (path, metadata) = Self::metadata(url).await?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            FetchError::unavailable_with(url, format!("cannot read {}", path.display()), e)
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "read local file");
        Ok(Loaded::Content(Content {
            bytes: bytes.into(),
            last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        }))
    }

    async fn length(&self, url: &str, _ctx: &FetchContext) -> Result<Option<u64>, FetchError> {
        let (_, metadata) = Self::metadata(url).await?;
        Ok(Some(metadata.len()))
    }

    async fn last_modified(
        &self,
        url: &str,
        _ctx: &FetchContext,
    ) -> Result<Option<DateTime<Utc>>, FetchError> {
        let (_, metadata) = Self::metadata(url).await?;
        Ok(metadata.modified().ok().map(DateTime::<Utc>::from))
    }

    async fn open_stream(
        &self,
        url: &str,
        _ctx: &FetchContext,
    ) -> Result<Option<ContentStream>, FetchError> {
        let path = Self::url_to_path(url)?;
        let file = tokio::fs::File::open(&path).await.map_err(|e| {
            FetchError::unavailable_with(url, format!("cannot open {}", path.display()), e)
        })?;
        Ok(Some(Box::new(file)))
    }
}
