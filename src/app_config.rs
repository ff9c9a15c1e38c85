//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use crawl_fetch::{FetchConfig, FolderSeparator, config::MAX_HTTP_TIMEOUT_SECS};

/// `key = value` file configuration for crawl-fetch defaults.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    /// HTTP fetch budget in seconds.
    pub http_timeout_secs: Option<u64>,
    /// HTTP connect timeout in seconds (also used for mail server connects).
    pub http_connect_timeout_secs: Option<u64>,
    /// Mailbox folder separator dialect.
    pub folder_separator: Option<FolderSeparator>,
    /// Mount point of network shares.
    pub share_mount_root: Option<PathBuf>,
    /// Directory for owned temporary files.
    pub temp_dir: Option<PathBuf>,
    /// Prefix for owned temporary file names.
    pub temp_prefix: Option<String>,
    /// Content above this many bytes is moved to a temporary file.
    pub spill_threshold: Option<u64>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        validate_timeout_secs("http_timeout_secs", self.http_timeout_secs)?;
        validate_timeout_secs("http_connect_timeout_secs", self.http_connect_timeout_secs)?;
        if let Some(prefix) = self.temp_prefix.as_deref()
            && prefix.is_empty()
        {
            bail!("Invalid config value for `temp_prefix`: must not be empty");
        }
        if self.spill_threshold == Some(0) {
            bail!("Invalid config value for `spill_threshold`: 0. Expected a positive byte count");
        }
        Ok(())
    }

    /// Builds the library configuration, keeping defaults for unset keys.
    #[must_use]
    pub fn to_fetch_config(&self) -> FetchConfig {
        let mut config = FetchConfig::default();
        if let Some(secs) = self.http_timeout_secs {
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.http_connect_timeout_secs {
            config.http_connect_timeout = Duration::from_secs(secs);
        }
        if let Some(separator) = self.folder_separator {
            config.folder_separator = separator;
        }
        if let Some(root) = &self.share_mount_root {
            config.share_mount_root.clone_from(root);
        }
        if self.temp_dir.is_some() {
            config.temp_dir.clone_from(&self.temp_dir);
        }
        if let Some(prefix) = &self.temp_prefix {
            config.temp_prefix.clone_from(prefix);
        }
        if self.spill_threshold.is_some() {
            config.spill_threshold = self.spill_threshold;
        }
        config
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=MAX_HTTP_TIMEOUT_SECS).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..={MAX_HTTP_TIMEOUT_SECS}");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Returns the tracing level this setting selects.
    #[must_use]
    pub fn log_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose | Self::Debug => "debug",
            Self::Quiet => "error",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config; defaults when no file exists.
    pub config: FileConfig,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/crawl-fetch/config.toml`
/// 2. `$HOME/.config/crawl-fetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("crawl-fetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("crawl-fetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit` (which must exist) or from the default path if present.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(path_ref) if path_ref.exists() => {
            let config = load_file_config(path_ref)?;
            Ok(LoadedConfig {
                path,
                config,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            config: FileConfig::default(),
            loaded_from_file: false,
        }),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let line_number = line_index + 1;

        match key {
            "http_timeout_secs" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `http_timeout_secs` value on line {line_number}")
                })?;
                cfg.http_timeout_secs = Some(parsed);
            }
            "http_connect_timeout_secs" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `http_connect_timeout_secs` value on line {line_number}")
                })?;
                cfg.http_connect_timeout_secs = Some(parsed);
            }
            "folder_separator" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `folder_separator` value on line {line_number}")
                })?;
                let separator = FolderSeparator::parse(&parsed).with_context(|| {
                    format!(
                        "Invalid `folder_separator` value '{parsed}' on line {line_number}: expected \"slash\" or \"dot\""
                    )
                })?;
                cfg.folder_separator = Some(separator);
            }
            "share_mount_root" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `share_mount_root` value on line {line_number}")
                })?;
                cfg.share_mount_root = Some(PathBuf::from(parsed));
            }
            "temp_dir" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `temp_dir` value on line {line_number}"))?;
                cfg.temp_dir = Some(PathBuf::from(parsed));
            }
            "temp_prefix" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `temp_prefix` value on line {line_number}")
                })?;
                cfg.temp_prefix = Some(parsed);
            }
            "spill_threshold" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `spill_threshold` value on line {line_number}")
                })?;
                cfg.spill_threshold = Some(parsed);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `verbosity` value on line {line_number}"))?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_number}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
http_timeout_secs = 60
verbosity = "verbose"
"#,
        )
        .expect("partial config should parse");
        assert_eq!(cfg.http_timeout_secs, Some(60));
        assert_eq!(cfg.verbosity, Some(VerbositySetting::Verbose));
        assert!(cfg.temp_dir.is_none());
    }

    #[test]
    fn test_parse_config_all_fields_map_onto_fetch_config() {
        let cfg = parse_config_str(
            r#"
http_timeout_secs = 90
http_connect_timeout_secs = 5
folder_separator = "dot"
share_mount_root = "/srv/shares"
temp_dir = "/var/tmp/crawl"
temp_prefix = "doc_"
spill_threshold = 1048576
"#,
        )
        .expect("full config should parse");
        let config = cfg.to_fetch_config();
        assert_eq!(config.http_timeout, Duration::from_secs(90));
        assert_eq!(config.http_connect_timeout, Duration::from_secs(5));
        assert_eq!(config.folder_separator, FolderSeparator::Dot);
        assert_eq!(config.share_mount_root, PathBuf::from("/srv/shares"));
        assert_eq!(config.temp_dir, Some(PathBuf::from("/var/tmp/crawl")));
        assert_eq!(config.temp_prefix, "doc_");
        assert_eq!(config.spill_threshold, Some(1_048_576));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_keeps_library_defaults() {
        let config = parse_config_str("").unwrap().to_fetch_config();
        assert_eq!(config.http_timeout, Duration::from_secs(180));
        assert_eq!(config.temp_prefix, "crawl_");
        assert_eq!(config.spill_threshold, None);
    }

    #[test]
    fn test_parse_config_rejects_invalid_timeout() {
        let err = parse_config_str("http_timeout_secs = 0").expect_err("invalid timeout expected");
        assert!(err.to_string().contains("http_timeout_secs"));

        let err =
            parse_config_str("http_timeout_secs = 3601").expect_err("invalid timeout expected");
        assert!(err.to_string().contains("http_timeout_secs"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_separator() {
        let err = parse_config_str(r#"folder_separator = "backslash""#)
            .expect_err("unknown separator expected");
        assert!(format!("{err:#}").contains("folder_separator"));
    }

    #[test]
    fn test_parse_config_rejects_empty_prefix() {
        let err = parse_config_str(r#"temp_prefix = """#).expect_err("empty prefix expected");
        assert!(err.to_string().contains("temp_prefix"));
    }

    #[test]
    fn test_parse_config_rejects_numeric_values_with_trailing_tokens() {
        let err = parse_config_str("spill_threshold = 4 trailing")
            .expect_err("expected trailing token error");
        assert!(err.to_string().contains("spill_threshold"));
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r##"
http_timeout_secs = 30 # short budget
temp_prefix = "a#b" # hash inside string
"##,
        )
        .expect("config with comments should parse");
        assert_eq!(cfg.http_timeout_secs, Some(30));
        assert_eq!(cfg.temp_prefix.as_deref(), Some("a#b"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("unknown_key = 123").expect_err("unknown key error expected");
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(err.to_string().contains("unknown_key"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("http_timeout_secs 30").expect_err("syntax error expected");
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_verbosity_log_levels() {
        assert_eq!(VerbositySetting::Default.log_level(), "info");
        assert_eq!(VerbositySetting::Verbose.log_level(), "debug");
        assert_eq!(VerbositySetting::Quiet.log_level(), "error");
    }

    #[test]
    fn test_explicit_config_path_must_exist() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = load_config(Some(&missing)).expect_err("missing explicit file");
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_explicit_config_path_is_loaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "spill_threshold = 10\n").unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert!(loaded.loaded_from_file);
        assert_eq!(loaded.config.spill_threshold, Some(10));
    }
}
