//! Configuration loaded once at startup and shared read-only by every component.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Config file looked up in the working directory when no override is set.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "MIRROR_CONFIG";

/// Endpoint paths, resolved against [`Config::base_url`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoints {
    /// Directory listing endpoint.
    pub list_endpoint: String,
    /// Download-link resolution endpoint.
    pub get_endpoint: String,
}

/// Credentials sent with every API call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Password for the shared remote path.
    pub password: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Retry tuning for both the status-triggered and the error-triggered layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per layer, including the first one.
    pub max_attempts: u32,
    /// Base delay for exponential backoff on retryable statuses.
    pub backoff_base_ms: u64,
    /// Status codes that trigger a transport-level retry.
    pub retry_statuses: Vec<u16>,
    /// Lower bound of the random delay between error-triggered attempts.
    pub jitter_min_ms: u64,
    /// Upper bound of the random delay between error-triggered attempts.
    pub jitter_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1000,
            retry_statuses: vec![429, 500, 502, 503, 504],
            jitter_min_ms: 1000,
            jitter_max_ms: 3000,
        }
    }
}

impl RetryConfig {
    /// A policy with the same attempt counts but no sleeping, for tests.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            backoff_base_ms: 0,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
            ..Self::default()
        }
    }

    /// Base delay for exponential backoff.
    #[must_use]
    pub const fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Sets the number of attempts per layer.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

/// Tuning knobs for a sync run. Every field has a default, so the whole
/// `sync` table may be omitted from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Entries requested per listing call.
    pub per_page: u32,
    /// Total timeout for listing and link-resolution requests.
    pub list_timeout_secs: u64,
    /// Connect/read timeout for file downloads.
    pub download_timeout_secs: u64,
    /// Suffix for in-flight downloads; such files never count as present.
    pub temp_suffix: String,
    /// Letter whose case is probed after a `/` when a subdirectory is listed.
    /// `None` disables probing.
    pub probe_letter: Option<char>,
    /// Extensions treated as interchangeable when checking presence.
    pub extension_variants: Vec<String>,
    /// Skip TLS certificate verification (self-signed endpoints).
    pub accept_invalid_certs: bool,
    /// Write buffer size for streamed downloads.
    pub buffer_size: usize,
    /// Retry policy.
    pub retry: RetryConfig,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            per_page: 100,
            list_timeout_secs: 30,
            download_timeout_secs: 60,
            temp_suffix: ".tmp".to_string(),
            probe_letter: Some('p'),
            extension_variants: [".mp4", ".MP4", ".Mp4", ".mP4"]
                .into_iter()
                .map(String::from)
                .collect(),
            accept_invalid_certs: true,
            buffer_size: 64 * 1024,
            retry: RetryConfig::default(),
        }
    }
}

impl SyncOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout for listing and link-resolution requests.
    #[must_use]
    pub const fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    /// Connect/read timeout for downloads.
    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Sets the probed letter, or disables probing with `None`.
    #[must_use]
    pub const fn with_probe_letter(mut self, letter: Option<char>) -> Self {
        self.probe_letter = letter;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the temporary-file suffix.
    #[must_use]
    pub fn with_temp_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.temp_suffix = suffix.into();
        self
    }
}

/// Complete configuration for one process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Headers attached to every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Remote directory that is mirrored.
    pub base_path: String,
    /// Local mirror root.
    pub save_dir: PathBuf,
    /// Scheme and host of the API.
    pub base_url: String,
    /// Endpoint paths.
    pub api: ApiEndpoints,
    /// Credentials.
    pub auth: AuthConfig,
    /// Optional tuning.
    #[serde(default)]
    pub sync: SyncOptions,
}

impl Config {
    /// Loads a config file. Paths ending in `.toml` are parsed as TOML,
    /// everything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigNotFound`] when the file does not exist and
    /// [`Error::Config`] when it cannot be parsed or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_toml(&contents)
        } else {
            Self::from_json(&contents)
        }
    }

    /// Parses and validates a JSON config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed input.
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a TOML config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed input.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the config path from `MIRROR_CONFIG`, falling back to
    /// `config.json` in the working directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
    }

    fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("base_url {:?}: {e}", self.base_url)))?;
        if self.sync.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.sync.per_page == 0 {
            return Err(Error::Config("per_page must be at least 1".into()));
        }
        if self.sync.temp_suffix.is_empty() {
            return Err(Error::Config("temp_suffix must not be empty".into()));
        }
        Ok(())
    }
}
