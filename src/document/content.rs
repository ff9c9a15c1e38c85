//! Content states of a document and the pure transitions between them.
//!
//! A document's content is in exactly one [`ContentState`]. Accessors in
//! [`Document`](super::Document) drive the transitions; nothing here does
//! I/O except [`write_temp_file`].

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::error::FetchError;
use crate::fetch::{MAILBOX_FILE_EXTENSION, Scheme};

/// Longest suffix (dot included) still accepted as a file extension.
const MAX_EXTENSION_LEN: usize = 5;

/// Name assumed for HTTP URLs whose path is empty or ends with `/`.
const DIRECTORY_INDEX: &str = "index.html";

/// A file holding document content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingFile {
    /// Location on disk.
    pub path: PathBuf,
    /// True when this crate created the file and must delete it on disposal.
    pub temporary: bool,
}

impl BackingFile {
    /// A file created and owned by this crate.
    #[must_use]
    pub fn owned(path: PathBuf) -> Self {
        Self {
            path,
            temporary: true,
        }
    }

    /// A file supplied by the caller; never deleted here.
    #[must_use]
    pub fn borrowed(path: PathBuf) -> Self {
        Self {
            path,
            temporary: false,
        }
    }
}

/// Where the content of a document currently lives.
#[derive(Debug, Clone, Default)]
pub enum ContentState {
    /// Nothing fetched yet (lazy adapters only).
    #[default]
    Unloaded,
    /// Full content buffered.
    InMemory(Bytes),
    /// Content lives only in a file.
    FileBacked(BackingFile),
    /// Buffered content plus a file derived from it.
    Mirrored {
        /// The buffered content.
        bytes: Bytes,
        /// The derived file.
        file: BackingFile,
    },
}

/// Discriminant of [`ContentState`], for inspection and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// See [`ContentState::Unloaded`].
    Unloaded,
    /// See [`ContentState::InMemory`].
    InMemory,
    /// See [`ContentState::FileBacked`].
    FileBacked,
    /// See [`ContentState::Mirrored`].
    Mirrored,
}

impl ContentState {
    /// Returns the state's discriminant.
    #[must_use]
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Unloaded => StateKind::Unloaded,
            Self::InMemory(_) => StateKind::InMemory,
            Self::FileBacked(_) => StateKind::FileBacked,
            Self::Mirrored { .. } => StateKind::Mirrored,
        }
    }

    /// Returns the buffered content, if any.
    #[must_use]
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            Self::InMemory(bytes) | Self::Mirrored { bytes, .. } => Some(bytes),
            Self::Unloaded | Self::FileBacked(_) => None,
        }
    }

    /// Returns the backing file, if any.
    #[must_use]
    pub fn file(&self) -> Option<&BackingFile> {
        match self {
            Self::FileBacked(file) | Self::Mirrored { file, .. } => Some(file),
            Self::Unloaded | Self::InMemory(_) => None,
        }
    }

    /// State after `bytes` were loaded. A backing file is kept.
    #[must_use]
    pub fn with_bytes(self, bytes: Bytes) -> Self {
        match self {
            Self::FileBacked(file) | Self::Mirrored { file, .. } => Self::Mirrored { bytes, file },
            Self::Unloaded | Self::InMemory(_) => Self::InMemory(bytes),
        }
    }

    /// State after `file` became the backing file. Buffered bytes are kept.
    #[must_use]
    pub fn with_file(self, file: BackingFile) -> Self {
        match self {
            Self::InMemory(bytes) | Self::Mirrored { bytes, .. } => Self::Mirrored { bytes, file },
            Self::Unloaded | Self::FileBacked(_) => Self::FileBacked(file),
        }
    }

    /// State after the owned temporary file (if any) was released.
    #[must_use]
    pub fn without_temporary_file(self) -> Self {
        match self {
            Self::Mirrored { bytes, file } if file.temporary => Self::InMemory(bytes),
            Self::FileBacked(file) if file.temporary => Self::Unloaded,
            other => other,
        }
    }

    /// Returns true when a call to `as_file(force_fresh)` must create a new file.
    #[must_use]
    pub fn needs_new_file(&self, force_fresh: bool) -> bool {
        match self.file() {
            None => true,
            Some(file) => force_fresh && !file.temporary,
        }
    }
}

/// Infers the temp-file suffix for content fetched from `url`.
///
/// HTTP URLs use the extension of their last path segment (`index.html` for
/// directory URLs); suffixes of six or more characters are ignored. Mailbox
/// URLs always map to [`MAILBOX_FILE_EXTENSION`]. Everything else gets none.
#[must_use]
pub fn infer_extension(url: &str) -> String {
    match Scheme::of(url) {
        Some(Scheme::Http | Scheme::Https) => {
            let path = Url::parse(url).map_or_else(|_| url.to_string(), |u| u.path().to_string());
            let path = if path.is_empty() || path.ends_with('/') {
                DIRECTORY_INDEX.to_string()
            } else {
                path
            };
            let name = path.rsplit('/').next().unwrap_or_default();
            match name.rfind('.') {
                Some(dot) if name.len() - dot <= MAX_EXTENSION_LEN => name[dot..].to_string(),
                _ => String::new(),
            }
        }
        Some(Scheme::Imap | Scheme::Imaps) => MAILBOX_FILE_EXTENSION.to_string(),
        _ => String::new(),
    }
}

/// Creates a uniquely named file in `dir` and writes `bytes` into it.
///
/// # Errors
///
/// Returns [`FetchError::TemporaryResource`] when the file cannot be created
/// or written; a partially written file is removed.
pub async fn write_temp_file(
    dir: &Path,
    prefix: &str,
    extension: &str,
    bytes: &[u8],
) -> Result<PathBuf, FetchError> {
    let named = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(extension)
        .tempfile_in(dir)
        .map_err(|e| FetchError::temporary(dir, e))?;
    let (file, path) = named
        .keep()
        .map_err(|e| FetchError::temporary(dir, e.error))?;
    drop(file);

    if let Err(e) = tokio::fs::write(&path, bytes).await {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(FetchError::temporary(path, e));
    }
    debug!(path = %path.display(), bytes = bytes.len(), "wrote temporary file");
    Ok(path)
}
