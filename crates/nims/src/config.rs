//! Provider configuration.
//!
//! Built once by the process bootstrap and shared by `Arc`. Every setting
//! except the API key has a default, so a missing key only surfaces when
//! the first job is submitted.

use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::RetryBackoff;
use crate::error::JobError;

/// Default NVIDIA Health API base URL.
pub const DEFAULT_BASE_URL: &str = "https://health.api.nvidia.com/v1";
/// Default RCSB download base URL.
pub const DEFAULT_RCSB_BASE_URL: &str = "https://files.rcsb.org/download";
/// Default UniProt REST base URL.
pub const DEFAULT_UNIPROT_BASE_URL: &str = "https://rest.uniprot.org/uniprotkb";

/// Settings for talking to the provider and its helper sources.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Bearer token for the provider. `None` until configured.
    pub api_key: Option<String>,
    /// Base URL that capability endpoint paths are appended to.
    pub base_url: String,
    /// Base URL for `GET <status_url>/<request_id>`.
    pub status_url: String,
    /// Wait between consecutive status polls.
    pub poll_interval: Duration,
    /// Consecutive transient failures tolerated before giving up.
    pub max_transient_failures: u32,
    /// Wall-clock budget for one polling campaign.
    pub max_poll_duration: Duration,
    /// Per-HTTP-call timeout.
    pub request_timeout: Duration,
    /// Attempts for the initial submission on transient errors.
    pub submit_attempts: u32,
    /// Extra PEM bundle added to the trust store.
    pub ca_bundle: Option<PathBuf>,
    /// Skip TLS verification. Development only.
    pub insecure_tls: bool,
    /// Where PDB entries referenced by id are downloaded from.
    pub rcsb_base_url: String,
    /// Where UniProt sequences referenced by accession are downloaded from.
    pub uniprot_base_url: String,
    /// Root directory for stored result artifacts.
    pub result_dir: PathBuf,
    /// Backoff applied to submission retries and rate limiting.
    pub backoff: RetryBackoff,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            status_url: format!("{DEFAULT_BASE_URL}/status"),
            poll_interval: Duration::from_secs(30),
            max_transient_failures: 50,
            max_poll_duration: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(180),
            submit_attempts: 3,
            ca_bundle: None,
            insecure_tls: false,
            rcsb_base_url: DEFAULT_RCSB_BASE_URL.to_string(),
            uniprot_base_url: DEFAULT_UNIPROT_BASE_URL.to_string(),
            result_dir: PathBuf::from("./data/results"),
            backoff: RetryBackoff::default(),
        }
    }
}

/// A malformed environment variable.
#[derive(Debug, thiserror::Error)]
#[error("{var} must be {expected}, got '{value}'")]
pub struct ConfigError {
    pub var: &'static str,
    pub expected: &'static str,
    pub value: String,
}

impl ProviderConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                             |
    /// |-------------------------------|-------------------------------------|
    /// | `NVIDIA_API_KEY`              | (none)                              |
    /// | `NIMS_BASE_URL`               | `https://health.api.nvidia.com/v1`  |
    /// | `NIMS_STATUS_URL`             | `<base>/status`                     |
    /// | `NIMS_POLL_INTERVAL_SECS`     | `30`                                |
    /// | `NIMS_MAX_TRANSIENT_FAILURES` | `50`                                |
    /// | `NIMS_MAX_POLL_SECS`          | `3600`                              |
    /// | `NIMS_REQUEST_TIMEOUT_SECS`   | `180`                               |
    /// | `NIMS_SUBMIT_ATTEMPTS`        | `3`                                 |
    /// | `NIMS_CA_BUNDLE`              | (system roots only)                 |
    /// | `NIMS_INSECURE_TLS`           | `false`                             |
    /// | `RCSB_BASE_URL`               | `https://files.rcsb.org/download`   |
    /// | `UNIPROT_BASE_URL`            | `https://rest.uniprot.org/uniprotkb`|
    /// | `RESULT_STORAGE_DIR`          | `./data/results`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_url = var("NIMS_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);
        let status_url = var("NIMS_STATUS_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("{base_url}/status"));

        Ok(Self {
            api_key: var("NVIDIA_API_KEY"),
            status_url,
            poll_interval: Duration::from_secs(parse_positive(
                var("NIMS_POLL_INTERVAL_SECS"),
                "NIMS_POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )?),
            max_transient_failures: parse_or(
                var("NIMS_MAX_TRANSIENT_FAILURES"),
                "NIMS_MAX_TRANSIENT_FAILURES",
                defaults.max_transient_failures,
            )?,
            max_poll_duration: Duration::from_secs(parse_or(
                var("NIMS_MAX_POLL_SECS"),
                "NIMS_MAX_POLL_SECS",
                defaults.max_poll_duration.as_secs(),
            )?),
            request_timeout: Duration::from_secs(parse_or(
                var("NIMS_REQUEST_TIMEOUT_SECS"),
                "NIMS_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            submit_attempts: parse_or(
                var("NIMS_SUBMIT_ATTEMPTS"),
                "NIMS_SUBMIT_ATTEMPTS",
                defaults.submit_attempts,
            )?
            .max(1),
            ca_bundle: var("NIMS_CA_BUNDLE").map(PathBuf::from),
            insecure_tls: parse_bool(var("NIMS_INSECURE_TLS"), "NIMS_INSECURE_TLS")?,
            rcsb_base_url: var("RCSB_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.rcsb_base_url),
            uniprot_base_url: var("UNIPROT_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.uniprot_base_url),
            result_dir: var("RESULT_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.result_dir),
            backoff: defaults.backoff,
            base_url,
        })
    }

    /// The API key, or a configuration error if it was never set.
    pub fn api_key(&self) -> Result<&str, JobError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| JobError::Configuration("NVIDIA_API_KEY is not set".to_string()))
    }

    /// Full URL for a capability endpoint path such as `/biology/mit/diffdock`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Full status URL for a provider request id.
    pub fn status_endpoint(&self, request_id: &str) -> String {
        format!("{}/{}", self.status_url, request_id)
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError {
            var,
            expected: "a non-negative integer",
            value,
        }),
    }
}

/// Like [`parse_or`], but zero is rejected.
fn parse_positive(raw: Option<String>, var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match parse_or(raw.clone(), var, default)? {
        0 => Err(ConfigError {
            var,
            expected: "at least 1",
            value: raw.unwrap_or_default(),
        }),
        value => Ok(value),
    }
}

fn parse_bool(raw: Option<String>, var: &'static str) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("0" | "false" | "no" | "off") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some(_) => Err(ConfigError {
            var,
            expected: "a boolean (true/false)",
            value: raw.unwrap_or_default(),
        }),
    }
}
