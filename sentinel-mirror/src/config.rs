//! INI configuration file.
//!
//! ```ini
//! [hub]
//! url = https://scihub.copernicus.eu/dhus
//! username = alice
//! password = secret
//! timeout = 300
//! stream_timeout = 14400
//!
//! [download]
//! directory = /data/sentinel
//! max_retries = 3
//! retry_delay = 10
//! chunk_size = 8388608
//! read_timeout = 300
//! page_size = 100
//! checksum = md5
//!
//! [logging]
//! directory = ~/.sentinel-mirror/logs
//! level = info
//! ```
//!
//! Every key except the credentials has a default.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::catalog::DEFAULT_PAGE_SIZE;
use crate::checksum::ChecksumAlgorithm;
use crate::client::{Credentials, DEFAULT_STREAM_TIMEOUT_SECS};
use crate::logging::LoggingConfig;
use crate::retry::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS};
use crate::sync::SyncSettings;
use crate::transfer::{ResumableTransfer, DEFAULT_CHUNK_SIZE, DEFAULT_READ_TIMEOUT_SECS};

/// Default hub endpoint.
pub const DEFAULT_HUB_URL: &str = "https://scihub.copernicus.eu/dhus";

/// Default timeout for small hub requests, in seconds.
pub const DEFAULT_HUB_TIMEOUT_SECS: u64 = 300;

/// Name of the application directory under the platform config directory.
const APP_DIR: &str = "sentinel-mirror";

/// Errors that can occur while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("missing [{section}] {key} in configuration")]
    MissingValue {
        section: &'static str,
        key: &'static str,
    },

    #[error("invalid [{section}] {key} = '{value}'")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },
}

/// `[hub]` section.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub url: String,
    pub credentials: Credentials,
    pub timeout: Duration,
    /// Upper bound for one product or part stream.
    pub stream_timeout: Duration,
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadConfig {
    pub directory: PathBuf,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub chunk_size: usize,
    pub read_timeout: Duration,
    pub page_size: u64,
    pub checksum: ChecksumAlgorithm,
}

/// The whole configuration file.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub hub: HubConfig,
    pub download: DownloadConfig,
    pub logging: LoggingConfig,
}

/// Default location of the configuration file.
///
/// `<config dir>/sentinel-mirror/config.ini`, e.g.
/// `~/.config/sentinel-mirror/config.ini` on Linux.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.ini")
}

/// Default location of the request file, next to the configuration.
pub fn default_requests_path() -> PathBuf {
    default_config_path().with_file_name("requests.csv")
}

/// Default mirror root, `<data dir>/sentinel-mirror`.
pub fn default_download_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Default log directory, `~/.sentinel-mirror/logs`.
pub fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sentinel-mirror")
        .join("logs")
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(raw: &str) -> PathBuf {
    match (raw.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if raw == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw)),
        _ => PathBuf::from(raw),
    }
}

struct Reader<'a> {
    ini: &'a Ini,
}

impl Reader<'_> {
    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.ini
            .section(Some(section))
            .and_then(|properties| properties.get(key))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn required(&self, section: &'static str, key: &'static str) -> Result<String, ConfigError> {
        self.get(section, key)
            .map(str::to_string)
            .ok_or(ConfigError::MissingValue { section, key })
    }

    fn parsed<T: FromStr>(
        &self,
        section: &'static str,
        key: &'static str,
        default: T,
    ) -> Result<T, ConfigError> {
        match self.get(section, key) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
                section,
                key,
                value: raw.to_string(),
            }),
        }
    }
}

impl ConfigFile {
    /// Load the configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Parse configuration text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(content).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            source: ini::Error::Parse(e),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let reader = Reader { ini };

        let hub = HubConfig {
            url: reader
                .get("hub", "url")
                .unwrap_or(DEFAULT_HUB_URL)
                .trim_end_matches('/')
                .to_string(),
            credentials: Credentials {
                username: reader.required("hub", "username")?,
                password: reader.required("hub", "password")?,
            },
            timeout: Duration::from_secs(reader.parsed("hub", "timeout", DEFAULT_HUB_TIMEOUT_SECS)?),
            stream_timeout: Duration::from_secs(reader.parsed(
                "hub",
                "stream_timeout",
                DEFAULT_STREAM_TIMEOUT_SECS,
            )?),
        };

        let download = DownloadConfig {
            directory: reader
                .get("download", "directory")
                .map(expand_tilde)
                .unwrap_or_else(default_download_dir),
            max_retries: reader.parsed("download", "max_retries", DEFAULT_MAX_RETRIES)?,
            retry_delay: Duration::from_secs(reader.parsed(
                "download",
                "retry_delay",
                DEFAULT_RETRY_DELAY_SECS,
            )?),
            chunk_size: reader.parsed("download", "chunk_size", DEFAULT_CHUNK_SIZE)?,
            read_timeout: Duration::from_secs(reader.parsed(
                "download",
                "read_timeout",
                DEFAULT_READ_TIMEOUT_SECS,
            )?),
            page_size: reader.parsed("download", "page_size", DEFAULT_PAGE_SIZE)?,
            checksum: reader.parsed("download", "checksum", ChecksumAlgorithm::default())?,
        };

        if download.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                section: "download",
                key: "page_size",
                value: "0".to_string(),
            });
        }

        let logging = LoggingConfig {
            directory: reader
                .get("logging", "directory")
                .map(expand_tilde)
                .unwrap_or_else(default_log_dir),
            level: reader.get("logging", "level").unwrap_or("info").to_string(),
        };

        Ok(Self {
            hub,
            download,
            logging,
        })
    }

    /// Retry policy for hub requests.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.download.max_retries, self.download.retry_delay)
    }

    /// Settings for the sync orchestrator.
    pub fn sync_settings(&self) -> SyncSettings {
        let transfer = ResumableTransfer::new(self.retry_policy())
            .with_chunk_size(self.download.chunk_size)
            .with_read_timeout(self.download.read_timeout)
            .with_algorithm(self.download.checksum);

        SyncSettings::new(&self.hub.url, &self.download.directory)
            .with_retry(self.retry_policy())
            .with_page_size(self.download.page_size)
            .with_transfer(transfer)
    }
}
