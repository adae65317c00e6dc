//! Configuration structures consumed by the shipper lifecycle.
//!
//! [`LogShipperBuilder`](crate::LogShipperBuilder) validates these values
//! before handing them to [`LogShipper`](crate::LogShipper). A
//! [`ShipperConfig`] can also be read from an INI file so services can keep
//! workspace credentials next to the rest of their deployment settings.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use ini::Ini;

use crate::error::ShipperBuildError;
use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

/// Host suffix of the public-cloud ingestion endpoint.
pub const DEFAULT_INGESTION_HOST: &str = "ods.opinsights.azure.com";
/// Data collector API version pinned in the request URL.
pub const API_VERSION: &str = "2016-04-01";
/// Overall request timeout applied by the HTTP agent.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Delay before the first retry of a rejected batch.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(15);
/// Upper bound on the delay between retries.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(120);
/// Number of retries attempted after the initial rejected post.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default bounded channel capacity of the retry worker.
pub const DEFAULT_RETRY_CAPACITY: usize = 1024;
/// Maximum length of a `Log-Type` value accepted by the service.
pub const MAX_LOG_TYPE_LEN: usize = 100;

/// Build the ingestion URL for a workspace on the given host.
pub fn ingestion_url(workspace_id: &str, host: &str) -> String {
    format!("https://{workspace_id}.{host}/api/logs?api-version={API_VERSION}")
}

/// Bounded exponential retry policy for rejected batches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry. Applied exactly, without jitter.
    pub initial_delay: Duration,
    /// Cap on the doubled delay for later retries.
    pub max_delay: Duration,
    /// Retries attempted before the batch is dropped.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_RETRY_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

/// Configuration object describing how to construct a
/// [`LogShipper`](crate::LogShipper).
#[derive(Clone, Debug)]
pub struct ShipperConfig {
    /// Workspace identifier; URL host label and signature key id.
    pub workspace_id: String,
    /// Base64 encoded shared key.
    pub workspace_secret: String,
    /// Value of the `Log-Type` header.
    pub log_type: String,
    /// Static fields merged into every record.
    pub metadata: BTreeMap<String, String>,
    /// Host suffix used to derive the ingestion URL.
    pub ingestion_host: String,
    /// Full URL override; takes precedence over `ingestion_host`.
    pub endpoint: Option<String>,
    /// Overall request timeout.
    pub request_timeout: Duration,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
    /// Retry policy for rejected batches.
    pub retry: RetryPolicy,
    /// Bounded channel capacity of the retry worker.
    pub retry_capacity: usize,
    /// Interval between rate-limited warnings about dropped retries.
    pub warn_interval: Duration,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            workspace_id: String::new(),
            workspace_secret: String::new(),
            log_type: String::new(),
            metadata: BTreeMap::new(),
            ingestion_host: DEFAULT_INGESTION_HOST.into(),
            endpoint: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry: RetryPolicy::default(),
            retry_capacity: DEFAULT_RETRY_CAPACITY,
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }
}

impl ShipperConfig {
    /// URL requests are posted to.
    pub fn url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => ingestion_url(&self.workspace_id, &self.ingestion_host),
        }
    }

    /// Read configuration from an INI file.
    ///
    /// Recognised sections are `[workspace]` (`id`, `secret`, `log_type`,
    /// `ingestion_host`, `endpoint`), `[metadata]` (any keys) and `[retry]`
    /// (`initial_delay_ms`, `max_delay_ms`, `max_attempts`, `capacity`,
    /// `warn_interval_ms`).
    ///
    /// # Errors
    ///
    /// Returns [`ShipperBuildError::Io`] if the file cannot be read and
    /// [`ShipperBuildError::Ini`] if it is empty or malformed.
    pub fn from_ini_file(path: impl AsRef<Path>) -> Result<Self, ShipperBuildError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => ShipperBuildError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("{} doesn't exist", path.display()),
            )),
            _ => ShipperBuildError::Io(err),
        })?;
        if text.trim().is_empty() {
            return Err(ShipperBuildError::Ini(format!(
                "{} is an empty file",
                path.display()
            )));
        }
        Self::from_ini_str(&text)
    }

    /// Parse configuration from INI text. See [`Self::from_ini_file`].
    ///
    /// # Errors
    ///
    /// Returns [`ShipperBuildError::Ini`] on malformed input or values.
    pub fn from_ini_str(text: &str) -> Result<Self, ShipperBuildError> {
        let ini =
            Ini::load_from_str(text).map_err(|err| ShipperBuildError::Ini(err.to_string()))?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("workspace")) {
            for (key, value) in section.iter() {
                match key {
                    "id" => config.workspace_id = value.to_string(),
                    "secret" => config.workspace_secret = value.to_string(),
                    "log_type" => config.log_type = value.to_string(),
                    "ingestion_host" => config.ingestion_host = value.to_string(),
                    "endpoint" => config.endpoint = Some(value.to_string()),
                    other => {
                        return Err(ShipperBuildError::Ini(format!(
                            "unknown key '{other}' in [workspace]"
                        )));
                    }
                }
            }
        }

        if let Some(section) = ini.section(Some("metadata")) {
            config.metadata = section
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }

        if let Some(section) = ini.section(Some("retry")) {
            for (key, value) in section.iter() {
                match key {
                    "initial_delay_ms" => {
                        config.retry.initial_delay = Duration::from_millis(parse_u64(key, value)?);
                    }
                    "max_delay_ms" => {
                        config.retry.max_delay = Duration::from_millis(parse_u64(key, value)?);
                    }
                    "max_attempts" => {
                        config.retry.max_attempts = parse_u64(key, value)?
                            .try_into()
                            .map_err(|_| ShipperBuildError::Ini(format!("{key} is too large")))?;
                    }
                    "warn_interval_ms" => {
                        config.warn_interval = Duration::from_millis(parse_u64(key, value)?);
                    }
                    "capacity" => {
                        config.retry_capacity = parse_u64(key, value)?
                            .try_into()
                            .map_err(|_| ShipperBuildError::Ini(format!("{key} is too large")))?;
                    }
                    other => {
                        return Err(ShipperBuildError::Ini(format!(
                            "unknown key '{other}' in [retry]"
                        )));
                    }
                }
            }
        }

        Ok(config)
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ShipperBuildError> {
    value
        .trim()
        .parse()
        .map_err(|_| ShipperBuildError::Ini(format!("{key} must be a non-negative integer")))
}
