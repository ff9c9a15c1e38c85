//! Runtime configuration for the fetch subsystem.
//!
//! Configuration is an explicit value handed to [`Fetcher::new`](crate::Fetcher::new);
//! nothing in the crate reads process-wide mutable settings.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default HTTP fetch budget (3 minutes for the whole transfer).
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 180;

/// Default HTTP connect timeout (30 seconds).
pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Largest accepted HTTP budget (1 hour).
pub const MAX_HTTP_TIMEOUT_SECS: u64 = 3600;

/// Default mount point under which `smb://host/share/...` is reachable.
pub const DEFAULT_SHARE_MOUNT_ROOT: &str = "/mnt/smb";

/// Default prefix for owned temporary files.
pub const DEFAULT_TEMP_PREFIX: &str = "crawl_";

/// How a mail server separates folder hierarchy levels.
///
/// URLs always use `/`; servers such as Dovecot expect `.` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FolderSeparator {
    /// Keep `/` between folder levels.
    #[default]
    Slash,
    /// Translate `/` to `.` between folder levels.
    Dot,
}

impl FolderSeparator {
    /// Returns the separator character sent to the server.
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Slash => '/',
            Self::Dot => '.',
        }
    }

    /// Parses a config label (`slash`, `/`, `dot`, `.`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "slash" | "/" => Some(Self::Slash),
            "dot" | "." => Some(Self::Dot),
            _ => None,
        }
    }
}

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// HTTP timeout outside `1..=3600` seconds.
    #[error("invalid HTTP timeout {secs}s: expected range 1..={MAX_HTTP_TIMEOUT_SECS}")]
    HttpTimeout {
        /// The rejected value in seconds.
        secs: u64,
    },

    /// Temp-file prefix must not be empty.
    #[error("temporary file prefix must not be empty")]
    EmptyTempPrefix,
}

/// Settings consumed by the adapters and the materialization cache.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Wall-clock budget for one HTTP fetch.
    pub http_timeout: Duration,
    /// Connect timeout of the underlying HTTP client.
    pub http_connect_timeout: Duration,
    /// Mailbox folder separator dialect.
    pub folder_separator: FolderSeparator,
    /// Directory where network shares are mounted.
    pub share_mount_root: PathBuf,
    /// Directory for owned temporary files; `None` means the OS temp dir.
    pub temp_dir: Option<PathBuf>,
    /// Prefix for owned temporary file names.
    pub temp_prefix: String,
    /// Content larger than this is moved to an owned temp file.
    pub spill_threshold: Option<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            http_connect_timeout: Duration::from_secs(DEFAULT_HTTP_CONNECT_TIMEOUT_SECS),
            folder_separator: FolderSeparator::default(),
            share_mount_root: PathBuf::from(DEFAULT_SHARE_MOUNT_ROOT),
            temp_dir: None,
            temp_prefix: DEFAULT_TEMP_PREFIX.to_string(),
            spill_threshold: None,
        }
    }
}

impl FetchConfig {
    /// Validates value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero or oversized HTTP timeout and for an
    /// empty temp prefix.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secs = self.http_timeout.as_secs();
        if self.http_timeout.is_zero() || secs > MAX_HTTP_TIMEOUT_SECS {
            return Err(ConfigError::HttpTimeout { secs });
        }
        if self.temp_prefix.is_empty() {
            return Err(ConfigError::EmptyTempPrefix);
        }
        Ok(())
    }

    /// Returns the directory owned temporary files are created in.
    #[must_use]
    pub fn resolved_temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FetchConfig::default();
        assert_eq!(config.http_timeout, Duration::from_secs(180));
        assert_eq!(config.folder_separator, FolderSeparator::Slash);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = FetchConfig {
            http_timeout: Duration::ZERO,
            ..FetchConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::HttpTimeout { secs: 0 }));
    }

    #[test]
    fn test_oversized_timeout_rejected() {
        let config = FetchConfig {
            http_timeout: Duration::from_secs(7200),
            ..FetchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HttpTimeout { secs: 7200 })
        ));
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let config = FetchConfig {
            temp_prefix: String::new(),
            ..FetchConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyTempPrefix));
    }

    #[test]
    fn test_folder_separator_parse() {
        assert_eq!(FolderSeparator::parse("dot"), Some(FolderSeparator::Dot));
        assert_eq!(FolderSeparator::parse(" / "), Some(FolderSeparator::Slash));
        assert_eq!(FolderSeparator::parse("backslash"), None);
        assert_eq!(FolderSeparator::Dot.as_char(), '.');
    }

    #[test]
    fn test_resolved_temp_dir_prefers_explicit() {
        let config = FetchConfig {
            temp_dir: Some(PathBuf::from("/var/tmp/crawl")),
            ..FetchConfig::default()
        };
        assert_eq!(config.resolved_temp_dir(), PathBuf::from("/var/tmp/crawl"));
    }
}
