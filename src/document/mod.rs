//! The document facade: one fetched (or fetchable) resource per crawl attempt.
//!
//! A [`Fetcher`] turns a [`DocumentRequest`] into a [`Retrieval`]. HTTP
//! documents are fetched immediately (bounded by the configured budget);
//! local, share and mailbox documents stay [`StateKind::Unloaded`] until the
//! first content accessor runs.
//!
//! # Lifecycle
//!
//! ```no_run
//! use crawl_fetch::{DocumentRequest, FetchConfig, Fetcher, Retrieval};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Fetcher::new(FetchConfig::default())?;
//! match fetcher.open(DocumentRequest::new("https://example.com/")).await? {
//!     Retrieval::Ready(mut document) => {
//!         let text = document.text().await?.to_string();
//!         println!("{} chars", text.len());
//!         document.dispose();
//!     }
//!     Retrieval::Redirect { to, .. } => println!("schedule {to}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod content;
pub mod disposal;

use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

pub use content::{BackingFile, ContentState, StateKind};
pub use disposal::DisposalManager;

use crate::config::FetchConfig;
use crate::credentials::AccountPassword;
use crate::error::{FetchError, SetupError};
use crate::fetch::{
    AdapterRegistry, ContentStream, FetchContext, HttpAdapter, ImapStore, Loaded, LocalAdapter,
    MailboxAdapter, MountedShare, ProtocolAdapter, ShareAdapter,
};
use crate::profiler::{Measurement, MeasurementSink, TracingSink};

/// Input for [`Fetcher::open`].
#[derive(Debug, Clone)]
pub struct DocumentRequest {
    url: String,
    source_url: Option<String>,
    source_link_text: Option<String>,
    credentials: Option<AccountPassword>,
    http_timeout: Option<Duration>,
}

impl DocumentRequest {
    /// A crawl-seed request for `url` (no referrer, anonymous).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_url: None,
            source_link_text: None,
            credentials: None,
            http_timeout: None,
        }
    }

    /// Records the referring page and the anchor text of the link.
    #[must_use]
    pub fn with_source(mut self, source_url: impl Into<String>, link_text: Option<String>) -> Self {
        self.source_url = Some(source_url.into());
        self.source_link_text = link_text;
        self
    }

    /// Authenticates share and mailbox access with `credentials`.
    #[must_use]
    pub fn with_credentials(mut self, credentials: AccountPassword) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Overrides the HTTP budget for this document only.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Returns the requested URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Result of opening a document.
#[derive(Debug)]
pub enum Retrieval {
    /// The document is ready for content access.
    Ready(Document),
    /// The resource moved. Not a failure: the crawler must schedule `to`.
    Redirect {
        /// The requested URL.
        from: String,
        /// The new location.
        to: String,
    },
}

/// Opens documents through a fixed set of protocol adapters.
///
/// Cheap to clone; clones share adapters, sink and disposal manager.
#[derive(Debug, Clone)]
pub struct Fetcher {
    registry: AdapterRegistry,
    config: Arc<FetchConfig>,
    sink: Arc<dyn MeasurementSink>,
    disposal: Arc<DisposalManager>,
}

impl Fetcher {
    /// Validates `config` and registers the four standard adapters.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] for invalid configuration or when the HTTP
    /// client cannot be built.
    pub fn new(config: FetchConfig) -> Result<Self, SetupError> {
        config.validate()?;
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(LocalAdapter::new()));
        registry.register(Arc::new(ShareAdapter::new(Arc::new(MountedShare::new(
            config.share_mount_root.clone(),
        )))));
        registry.register(Arc::new(MailboxAdapter::new(
            Arc::new(ImapStore::new(config.http_connect_timeout)),
            config.folder_separator,
        )));
        registry.register(Arc::new(HttpAdapter::new(&config)?));
        Ok(Self {
            registry,
            config: Arc::new(config),
            sink: Arc::new(TracingSink),
            disposal: Arc::new(DisposalManager::new()),
        })
    }

    /// Replaces the adapter serving `adapter.kind()`.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn ProtocolAdapter>) -> Self {
        self.registry.register(adapter);
        self
    }

    /// Sends load measurements to `sink` instead of the tracing sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MeasurementSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Returns the disposal manager shared by all documents of this fetcher.
    #[must_use]
    pub fn disposal(&self) -> &Arc<DisposalManager> {
        &self.disposal
    }

    /// Opens the document described by `request`.
    ///
    /// HTTP content is fetched here; a moved resource yields
    /// [`Retrieval::Redirect`]. Local documents are stat'ed for their
    /// modification time.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the scheme is unsupported or the eager
    /// fetch or stat fails.
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn open(&self, request: DocumentRequest) -> Result<Retrieval, FetchError> {
        let adapter = self.registry.adapter_for(&request.url)?;
        let context = FetchContext {
            credentials: request.credentials,
            http_timeout: request.http_timeout,
        };
        let mut document = Document {
            url: request.url,
            source_url: request.source_url,
            source_link_text: request.source_link_text,
            context,
            adapter,
            sink: Arc::clone(&self.sink),
            disposal: Arc::clone(&self.disposal),
            config: Arc::clone(&self.config),
            last_modified: Utc::now(),
            mime_type: None,
            links: HashMap::new(),
            state: ContentState::Unloaded,
            text: None,
            disposed: false,
        };

        if document.adapter.loads_eagerly() {
            if let Some(target) = document.load().await? {
                info!(to = %target, "document moved");
                document.disposed = true;
                return Ok(Retrieval::Redirect {
                    from: document.url.clone(),
                    to: target,
                });
            }
        } else if let Some(modified) = document
            .adapter
            .last_modified(&document.url, &document.context)
            .await?
        {
            document.last_modified = modified;
        }
        debug!(state = ?document.state.kind(), "document opened");
        Ok(Retrieval::Ready(document))
    }
}

/// One resource identified by URL, with lazily materialized content.
///
/// Call [`dispose`](Self::dispose) once the document has been consumed.
/// Dropping an undisposed document disposes it as a backstop.
#[derive(Debug)]
pub struct Document {
    url: String,
    source_url: Option<String>,
    source_link_text: Option<String>,
    context: FetchContext,
    adapter: Arc<dyn ProtocolAdapter>,
    sink: Arc<dyn MeasurementSink>,
    disposal: Arc<DisposalManager>,
    config: Arc<FetchConfig>,
    last_modified: DateTime<Utc>,
    mime_type: Option<String>,
    links: HashMap<String, String>,
    state: ContentState,
    text: Option<String>,
    disposed: bool,
}

impl Document {
    /// Returns the document URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the URL of the page the link was found on (`None` for seeds).
    #[must_use]
    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    /// Returns the anchor text of the link this document was found through.
    #[must_use]
    pub fn source_link_text(&self) -> Option<&str> {
        self.source_link_text.as_deref()
    }

    /// Returns the modification time: authoritative for local files and
    /// mailbox messages, the fetch time otherwise.
    #[must_use]
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Returns the MIME type set by the classifier, if any.
    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Records the MIME type determined by an external classifier.
    pub fn set_mime_type(&mut self, mime_type: impl Into<String>) {
        self.mime_type = Some(mime_type.into());
    }

    /// Records an outgoing link; a repeated target keeps the latest text.
    pub fn add_link(&mut self, url: impl Into<String>, text: impl Into<String>) {
        self.links.insert(url.into(), text.into());
    }

    /// Returns the outgoing links (target URL to link text).
    #[must_use]
    pub fn links(&self) -> &HashMap<String, String> {
        &self.links
    }

    /// Returns true when at least one link was recorded.
    #[must_use]
    pub fn has_links(&self) -> bool {
        !self.links.is_empty()
    }

    /// Returns where the content currently lives.
    #[must_use]
    pub fn state_kind(&self) -> StateKind {
        self.state.kind()
    }

    /// Returns true once [`dispose`](Self::dispose) ran.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Returns the full content, loading it on first access.
    ///
    /// Spilled (file-only) content is read from its file on every call.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when loading fails or the document was disposed.
    pub async fn bytes(&mut self) -> Result<Bytes, FetchError> {
        self.ensure_live()?;
        if let Some(bytes) = self.state.bytes() {
            return Ok(bytes.clone());
        }
        if let Some(file) = self.state.file() {
            let data = tokio::fs::read(&file.path)
                .await
                .map_err(|e| FetchError::temporary(file.path.clone(), e))?;
            return Ok(Bytes::from(data));
        }
        self.ensure_loaded().await?;
        self.bytes_from_state().await
    }

    /// Returns the content decoded as UTF-8 (lossy), decoding only once.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the content cannot be loaded.
    pub async fn text(&mut self) -> Result<&str, FetchError> {
        self.ensure_live()?;
        if self.text.is_none() {
            let bytes = self.bytes().await?;
            self.text = Some(String::from_utf8_lossy(&bytes).into_owned());
        }
        Ok(self.text.as_deref().unwrap_or_default())
    }

    /// Returns a fresh reader over the content; the caller owns and closes it.
    ///
    /// Unloaded local and share documents are streamed from the source
    /// without buffering.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the content or its file cannot be opened.
    pub async fn stream(&mut self) -> Result<ContentStream, FetchError> {
        self.ensure_live()?;
        if let Some(bytes) = self.state.bytes() {
            return Ok(Box::new(Cursor::new(bytes.clone())));
        }
        if let Some(file) = self.state.file() {
            let handle = tokio::fs::File::open(&file.path)
                .await
                .map_err(|e| FetchError::temporary(file.path.clone(), e))?;
            return Ok(Box::new(handle));
        }
        if let Some(stream) = self.adapter.open_stream(&self.url, &self.context).await? {
            return Ok(stream);
        }
        let bytes = self.bytes().await?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    /// Returns a file holding the content.
    ///
    /// An existing backing file is reused unless `force_fresh` is set and
    /// that file belongs to the caller; otherwise a new owned temporary file
    /// is created (and deleted by [`dispose`](Self::dispose)).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::TemporaryResource`] when the file cannot be written.
    pub async fn as_file(&mut self, force_fresh: bool) -> Result<PathBuf, FetchError> {
        self.ensure_live()?;
        // Loading may spill to an owned file, which is then the answer.
        self.ensure_loaded().await?;
        if !self.state.needs_new_file(force_fresh)
            && let Some(file) = self.state.file()
        {
            return Ok(file.path.clone());
        }
        let bytes = self.bytes_from_state().await?;
        let path = content::write_temp_file(
            &self.config.resolved_temp_dir(),
            &self.config.temp_prefix,
            &content::infer_extension(&self.url),
            &bytes,
        )
        .await?;
        self.state = std::mem::take(&mut self.state).with_file(BackingFile::owned(path.clone()));
        Ok(path)
    }

    /// Writes the content to the caller-supplied `path`.
    ///
    /// If the document has no backing file yet, `path` becomes it; it is
    /// never deleted by this crate.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when loading or writing fails.
    pub async fn write_to_file(&mut self, path: impl AsRef<Path>) -> Result<(), FetchError> {
        let path = path.as_ref();
        let bytes = self.bytes().await?;
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| FetchError::temporary(path, e))?;
        if self.state.file().is_none() {
            self.state =
                std::mem::take(&mut self.state).with_file(BackingFile::borrowed(path.to_path_buf()));
        }
        Ok(())
    }

    /// Returns the content length in bytes.
    ///
    /// Uses a stat when the adapter supports it; otherwise the content is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when neither a stat nor a load succeeds.
    pub async fn length(&mut self) -> Result<u64, FetchError> {
        self.ensure_live()?;
        if let Some(bytes) = self.state.bytes() {
            return Ok(byte_len(bytes));
        }
        if let Some(file) = self.state.file() {
            let metadata = tokio::fs::metadata(&file.path)
                .await
                .map_err(|e| FetchError::temporary(file.path.clone(), e))?;
            return Ok(metadata.len());
        }
        if let Some(length) = self.adapter.length(&self.url, &self.context).await? {
            return Ok(length);
        }
        Ok(byte_len(&self.bytes().await?))
    }

    /// Releases the owned temporary file, if any. Idempotent.
    ///
    /// Content accessors fail after disposal.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(file) = self.state.file() {
            self.disposal.release(file);
        }
        self.state = std::mem::take(&mut self.state).without_temporary_file();
    }

    fn ensure_live(&self) -> Result<(), FetchError> {
        if self.disposed {
            return Err(FetchError::unavailable(&self.url, "document already disposed"));
        }
        Ok(())
    }

    /// Loads the content unless it is already materialized.
    ///
    /// A redirect reported by a lazy load surfaces as [`FetchError::Moved`].
    async fn ensure_loaded(&mut self) -> Result<(), FetchError> {
        if self.state.kind() != StateKind::Unloaded {
            return Ok(());
        }
        if let Some(target) = self.load().await? {
            info!(to = %target, "document moved after opening");
            return Err(FetchError::moved(&self.url, target));
        }
        Ok(())
    }

        /// Loads through the adapter and stores the content. Returns the
    /// redirect target instead when the resource moved.
    async fn load(&mut self) -> Result<Option<String>, FetchError> {
        let measurement = Measurement::begin(Arc::clone(&self.sink), self.adapter.kind());
        let loaded = match self.adapter.load(&self.url, &self.context).await {
            Ok(loaded) => loaded,
            Err(e) => {
                measurement.abort();
                warn!(url = %self.url, error = %e, "loading document failed");
                return Err(e);
            }
        };
        match loaded {
            Loaded::Redirect { target } => {
                measurement.stop(0);
                Ok(Some(target))
            }
            Loaded::Content(content) => {
                measurement.stop(byte_len(&content.bytes));
                if let Some(modified) = content.last_modified {
                    self.last_modified = modified;
                }
                self.store(content.bytes).await?;
                Ok(None)
            }
        }
    }

    /// Keeps `bytes` in memory, or spills them to an owned file above the threshold.
    async fn store(&mut self, bytes: Bytes) -> Result<(), FetchError> {
        let spill = self
            .config
            .spill_threshold
            .is_some_and(|threshold| byte_len(&bytes) > threshold);
        if !spill {
            self.state = std::mem::take(&mut self.state).with_bytes(bytes);
            return Ok(());
        }
        let path = content::write_temp_file(
            &self.config.resolved_temp_dir(),
            &self.config.temp_prefix,
            &content::infer_extension(&self.url),
            &bytes,
        )
        .await?;
        debug!(path = %path.display(), bytes = bytes.len(), "spilled content to file");
        self.state = ContentState::FileBacked(BackingFile::owned(path));
        Ok(())
    }

    async fn bytes_from_state(&self) -> Result<Bytes, FetchError> {
        match &self.state {
            ContentState::InMemory(bytes) | ContentState::Mirrored { bytes, .. } => {
                Ok(bytes.clone())
            }
            ContentState::FileBacked(file) => tokio::fs::read(&file.path)
                .await
                .map(Bytes::from)
                .map_err(|e| FetchError::temporary(file.path.clone(), e)),
            ContentState::Unloaded => Err(FetchError::unavailable(&self.url, "content not loaded")),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn byte_len(bytes: &[u8]) -> u64 {
    u64::try_from(bytes.len()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fetch::{AdapterKind, Content};
    use crate::profiler::ProfileStats;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use url::Url;

    /// Lazy adapter serving fixed bytes for `smb://` URLs and counting loads.
    #[derive(Debug, Default)]
    struct CountingShare {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl ProtocolAdapter for CountingShare {
        fn kind(&self) -> AdapterKind {
            AdapterKind::Share
        }

        async fn load(&self, _url: &str, _ctx: &FetchContext) -> Result<Loaded, FetchError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Loaded::Content(Content::new(&b"0123456789abcdef"[..])))
        }
    }

    /// Eager adapter answering every `http://` URL with a redirect.
    #[derive(Debug)]
    struct MovedHttp;

    #[async_trait]
    impl ProtocolAdapter for MovedHttp {
        fn kind(&self) -> AdapterKind {
            AdapterKind::Http
        }

        fn loads_eagerly(&self) -> bool {
            true
        }

        async fn load(&self, _url: &str, _ctx: &FetchContext) -> Result<Loaded, FetchError> {
            Ok(Loaded::Redirect {
                target: "http://example.com/new".to_string(),
            })
        }
    }

    /// Lazy adapter whose deferred load finds the resource moved.
    #[derive(Debug)]
    struct RelocatedShare;

    #[async_trait]
    impl ProtocolAdapter for RelocatedShare {
        fn kind(&self) -> AdapterKind {
            AdapterKind::Share
        }

        async fn load(&self, _url: &str, _ctx: &FetchContext) -> Result<Loaded, FetchError> {
            Ok(Loaded::Redirect {
                target: "smb://server/archive/a".to_string(),
            })
        }
    }

    fn spilling_fetcher(dir: &TempDir) -> Fetcher {
        Fetcher::new(FetchConfig {
            temp_dir: Some(dir.path().to_path_buf()),
            spill_threshold: Some(4),
            ..FetchConfig::default()
        })
        .unwrap()
        .with_adapter(Arc::new(CountingShare::default()))
    }

    fn files_in(dir: &TempDir) -> Vec<PathBuf> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    fn fetcher_in(dir: &TempDir) -> Fetcher {
        Fetcher::new(FetchConfig {
            temp_dir: Some(dir.path().to_path_buf()),
            ..FetchConfig::default()
        })
        .unwrap()
    }

    fn local_file(dir: &TempDir, name: &str, content: &[u8]) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        Url::from_file_path(path).unwrap().to_string()
    }

    async fn ready(fetcher: &Fetcher, request: DocumentRequest) -> Document {
        match fetcher.open(request).await.unwrap() {
            Retrieval::Ready(document) => document,
            Retrieval::Redirect { to, .. } => panic!("unexpected redirect to {to}"),
        }
    }

    #[tokio::test]
    async fn test_local_document_lifecycle() {
        let files = TempDir::new().unwrap();
        let temps = TempDir::new().unwrap();
        let url = local_file(&files, "ten.txt", b"0123456789");
        let fetcher = fetcher_in(&temps);

        let mut document = ready(&fetcher, DocumentRequest::new(&url)).await;
        assert_eq!(document.length().await.unwrap(), 10);
        assert_eq!(document.state_kind(), StateKind::Unloaded);

        assert_eq!(&document.bytes().await.unwrap()[..], b"0123456789");
        assert_eq!(document.state_kind(), StateKind::InMemory);

        let temp = document.as_file(false).await.unwrap();
        assert!(temp.starts_with(temps.path()));
        assert_eq!(std::fs::read(&temp).unwrap(), b"0123456789");
        assert_eq!(document.state_kind(), StateKind::Mirrored);

        document.dispose();
        assert!(!temp.exists());
        assert!(Url::parse(&url).unwrap().to_file_path().unwrap().exists());
    }

    #[tokio::test]
    async fn test_local_last_modified_is_file_mtime() {
        let files = TempDir::new().unwrap();
        let url = local_file(&files, "a.txt", b"x");
        let mtime: DateTime<Utc> = std::fs::metadata(files.path().join("a.txt"))
            .unwrap()
            .modified()
            .unwrap()
            .into();
        let fetcher = fetcher_in(&files);

        let document = ready(&fetcher, DocumentRequest::new(url)).await;
        assert_eq!(document.last_modified(), mtime);
    }

    #[tokio::test]
    async fn test_missing_local_file_fails_at_open() {
        let files = TempDir::new().unwrap();
        let url = Url::from_file_path(files.path().join("missing.txt"))
            .unwrap()
            .to_string();
        let result = fetcher_in(&files).open(DocumentRequest::new(url)).await;
        assert!(matches!(result, Err(FetchError::ResourceUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_text_is_decoded_once_and_cached() {
        let temps = TempDir::new().unwrap();
        let share = Arc::new(CountingShare::default());
        let fetcher = fetcher_in(&temps).with_adapter(share.clone());

        let mut document = ready(&fetcher, DocumentRequest::new("smb://server/share/a")).await;
        let first = document.text().await.unwrap().to_string();
        let second = document.text().await.unwrap().to_string();
        assert_eq!(first, second);
        assert_eq!(first, "0123456789abcdef");
        assert_eq!(share.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_as_file_reuse_and_force_fresh() {
        let temps = TempDir::new().unwrap();
        let fetcher = fetcher_in(&temps).with_adapter(Arc::new(CountingShare::default()));
        let mut document = ready(&fetcher, DocumentRequest::new("smb://server/share/a")).await;

        let first = document.as_file(false).await.unwrap();
        assert_eq!(document.as_file(false).await.unwrap(), first);
        // An owned temp file is already exclusive, so forcing reuses it.
        assert_eq!(document.as_file(true).await.unwrap(), first);
        document.dispose();
        assert!(!first.exists());
    }

    #[tokio::test]
    async fn test_force_fresh_replaces_caller_file() {
        let temps = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let fetcher = fetcher_in(&temps).with_adapter(Arc::new(CountingShare::default()));
        let mut document = ready(&fetcher, DocumentRequest::new("smb://server/share/a")).await;

        let supplied = out.path().join("copy.bin");
        document.write_to_file(&supplied).await.unwrap();
        assert_eq!(document.as_file(false).await.unwrap(), supplied);

        let fresh = document.as_file(true).await.unwrap();
        assert_ne!(fresh, supplied);
        assert_eq!(std::fs::read(&fresh).unwrap(), b"0123456789abcdef");

        document.dispose();
        assert!(!fresh.exists());
        assert!(supplied.exists(), "caller file must survive disposal");
    }

    #[tokio::test]
    async fn test_add_link_last_write_wins() {
        let temps = TempDir::new().unwrap();
        let fetcher = fetcher_in(&temps).with_adapter(Arc::new(CountingShare::default()));
        let mut document = ready(&fetcher, DocumentRequest::new("smb://server/share/a")).await;

        assert!(!document.has_links());
        document.add_link("http://example.com/x", "first");
        document.add_link("http://example.com/x", "second");
        assert!(document.has_links());
        assert_eq!(document.links().len(), 1);
        assert_eq!(document.links()["http://example.com/x"], "second");
    }

    #[tokio::test]
    async fn test_redirect_is_not_a_document() {
        let temps = TempDir::new().unwrap();
        let stats = Arc::new(ProfileStats::new());
        let fetcher = fetcher_in(&temps)
            .with_adapter(Arc::new(MovedHttp))
            .with_sink(stats.clone());

        let retrieval = fetcher
            .open(DocumentRequest::new("http://example.com/old"))
            .await
            .unwrap();
        match retrieval {
            Retrieval::Redirect { from, to } => {
                assert_eq!(from, "http://example.com/old");
                assert_eq!(to, "http://example.com/new");
            }
            Retrieval::Ready(_) => panic!("Expected redirect"),
        }
        assert_eq!(stats.summary(AdapterKind::Http).bytes, 0);
    }

    #[tokio::test]
    async fn test_spilled_content_lives_in_owned_file() {
        let temps = TempDir::new().unwrap();
        let fetcher = Fetcher::new(FetchConfig {
            temp_dir: Some(temps.path().to_path_buf()),
            spill_threshold: Some(4),
            ..FetchConfig::default()
        })
        .unwrap()
        .with_adapter(Arc::new(CountingShare::default()));
        let mut document = ready(&fetcher, DocumentRequest::new("smb://server/share/a")).await;

        let bytes = document.bytes().await.unwrap();
        assert_eq!(&bytes[..], b"0123456789abcdef");
        assert_eq!(document.state_kind(), StateKind::FileBacked);
        assert_eq!(document.length().await.unwrap(), 16);

        let path = document.as_file(false).await.unwrap();
        let mut reader = document.stream().await.unwrap();
        let mut streamed = Vec::new();
        reader.read_to_end(&mut streamed).await.unwrap();
        assert_eq!(streamed, b"0123456789abcdef");

        document.dispose();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_as_file_before_load_reuses_spilled_file() {
        let temps = TempDir::new().unwrap();
        let fetcher = spilling_fetcher(&temps);
        let mut document = ready(&fetcher, DocumentRequest::new("smb://server/share/a")).await;

        let path = document.as_file(false).await.unwrap();
        assert_eq!(files_in(&temps), vec![path.clone()]);
        assert_eq!(document.state_kind(), StateKind::FileBacked);
        assert_eq!(std::fs::read(&path).unwrap(), b"0123456789abcdef");

        document.dispose();
        assert!(files_in(&temps).is_empty(), "temp files left: {:?}", files_in(&temps));
    }

    #[tokio::test]
    async fn test_write_to_file_after_spill_cleans_up_spilled_file() {
        let temps = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let fetcher = spilling_fetcher(&temps);
        let mut document = ready(&fetcher, DocumentRequest::new("smb://server/share/a")).await;

        let target = out.path().join("copy.bin");
        document.write_to_file(&target).await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"0123456789abcdef");
        assert_eq!(files_in(&temps).len(), 1);

        document.dispose();
        assert!(files_in(&temps).is_empty());
        assert!(target.exists());
    }

    #[tokio::test]
    async fn test_lazy_redirect_carries_target() {
        let temps = TempDir::new().unwrap();
        let fetcher = fetcher_in(&temps).with_adapter(Arc::new(RelocatedShare));
        let mut document = ready(&fetcher, DocumentRequest::new("smb://server/share/a")).await;

        let error = document.bytes().await.unwrap_err();
        assert_eq!(error.redirect_target(), Some("smb://server/archive/a"));
        let error = document.as_file(false).await.unwrap_err();
        assert!(matches!(error, FetchError::Moved { .. }));
        assert!(files_in(&temps).is_empty());
    }

    #[tokio::test]
    async fn test_profiler_counts_lazy_loads() {
        let temps = TempDir::new().unwrap();
        let stats = Arc::new(ProfileStats::new());
        let fetcher = fetcher_in(&temps)
            .with_adapter(Arc::new(CountingShare::default()))
            .with_sink(stats.clone());
        let mut document = ready(&fetcher, DocumentRequest::new("smb://server/share/a")).await;
        document.bytes().await.unwrap();

        let summary = stats.summary(AdapterKind::Share);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.bytes, 16);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_blocks_access() {
        let temps = TempDir::new().unwrap();
        let fetcher = fetcher_in(&temps).with_adapter(Arc::new(CountingShare::default()));
        let mut document = ready(
            &fetcher,
            DocumentRequest::new("smb://server/share/a")
                .with_source("http://example.com/index.html", Some("report".to_string())),
        )
        .await;
        assert_eq!(document.source_url(), Some("http://example.com/index.html"));
        assert_eq!(document.source_link_text(), Some("report"));
        assert_eq!(document.to_string(), "smb://server/share/a");

        assert_eq!(document.text().await.unwrap(), "0123456789abcdef");

        document.dispose();
        document.dispose();
        assert!(document.is_disposed());
        assert!(document.bytes().await.is_err());
        assert!(document.text().await.is_err());
    }

    #[tokio::test]
    async fn test_drop_releases_temp_file() {
        let temps = TempDir::new().unwrap();
        let fetcher = fetcher_in(&temps).with_adapter(Arc::new(CountingShare::default()));
        let path = {
            let mut document =
                ready(&fetcher, DocumentRequest::new("smb://server/share/a")).await;
            document.as_file(false).await.unwrap()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let temps = TempDir::new().unwrap();
        let result = fetcher_in(&temps)
            .open(DocumentRequest::new("gopher://example.com/"))
            .await;
        assert!(matches!(result, Err(FetchError::UnsupportedScheme { .. })));
    }
}
