//! Configuration types for evidence-dl

use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Largest accepted streaming chunk size (1 MiB)
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Main configuration for the evidence downloader
///
/// Every field has a default, so an empty JSON object is a valid configuration file.
/// The bearer token is passed to [`HttpTestService`](crate::service::HttpTestService)
/// as a separate [`Credential`](crate::Credential); only an optional fallback lives here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the REST API serving test runs and steps
    /// (default: "https://jira.example.com/rest/raven/1.0")
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL of the attachment servlet
    /// (default: "https://jira.example.com/plugins/servlet/raven")
    #[serde(default = "default_attachment_base_url")]
    pub attachment_base_url: String,

    /// Root directory evidence is written under (default: "test_case")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory holding the execution log and per-test-case logs (default: ".")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Maximum number of runs processed at the same time (default: 3)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Runs started at or before this instant are ignored (default: 2023-10-01T00:00:00)
    #[serde(default = "default_cutoff")]
    pub cutoff: NaiveDateTime,

    /// Timeout for JSON API calls (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Longest wait for an attachment's response headers or its next body chunk
    /// (default: 300 seconds)
    ///
    /// This is an idle limit: a download that keeps receiving data may run longer.
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,

    /// Size of the chunks written to disk while streaming (default: 65536 bytes)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Skip TLS certificate verification (default: true)
    ///
    /// Internal test-management servers commonly run on self-signed certificates.
    /// This disables all certificate checks and should be turned off wherever the
    /// service presents a trusted certificate.
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,

    /// Token used when the interactive prompt is left empty
    #[serde(default)]
    pub default_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            attachment_base_url: default_attachment_base_url(),
            output_dir: default_output_dir(),
            log_dir: default_log_dir(),
            max_workers: default_max_workers(),
            cutoff: default_cutoff(),
            request_timeout: default_request_timeout(),
            download_timeout: default_download_timeout(),
            chunk_size: default_chunk_size(),
            accept_invalid_certs: true,
            default_token: None,
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults. The result is validated before it
    /// is returned.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::filesystem(path, e))?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::config("max_workers", "must be at least 1"));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::config(
                "chunk_size",
                format!("must be between 1 and {MAX_CHUNK_SIZE} bytes"),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("request_timeout", "must be greater than zero"));
        }
        if self.download_timeout.is_zero() {
            return Err(Error::config("download_timeout", "must be greater than zero"));
        }
        for (key, value) in [
            ("api_base_url", &self.api_base_url),
            ("attachment_base_url", &self.attachment_base_url),
        ] {
            let url = url::Url::parse(value)
                .map_err(|e| Error::config(key, format!("invalid URL {value:?}: {e}")))?;
            if url.cannot_be_a_base() {
                return Err(Error::config(key, format!("{value:?} cannot be a base URL")));
            }
        }
        Ok(())
    }
}

fn default_api_base_url() -> String {
    "https://jira.example.com/rest/raven/1.0".to_string()
}

fn default_attachment_base_url() -> String {
    "https://jira.example.com/plugins/servlet/raven".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("test_case")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_workers() -> usize {
    3
}

fn default_cutoff() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 10, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_true() -> bool {
    true
}

// Durations are stored as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
