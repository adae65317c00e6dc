//! Builder for [`LogShipper`].
//!
//! Exposes workspace credentials, the log type, static metadata, endpoint
//! overrides, timeouts and retry parameters. Values are validated before the
//! HTTP agent and retry worker are created so a misconfigured shipper fails
//! at construction rather than on the first post.

use std::{collections::BTreeMap, time::Duration};

use super::LogShipper;
use crate::{
    clock::{Clock, SharedClock},
    config::{MAX_LOG_TYPE_LEN, RetryPolicy, ShipperConfig},
    error::ShipperBuildError,
    signer::SigningKey,
    transport::{SharedTransport, Transport, UreqTransport},
};

/// Longest label permitted in a DNS host name.
const MAX_DNS_LABEL_LEN: usize = 63;

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(ShipperBuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Optional overrides for the retry policy of rejected batches.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryOverrides {
    initial_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
}

impl RetryOverrides {
    /// Create overrides with no custom values.
    pub fn new() -> Self {
        Self::default()
    }

    option_setter!(
        #[doc = "Override the delay before the first retry in milliseconds."]
        with_initial_delay_ms,
        initial_delay_ms,
        u64
    );
    option_setter!(
        #[doc = "Override the cap on the doubled retry delay in milliseconds."]
        with_max_delay_ms,
        max_delay_ms,
        u64
    );
    option_setter!(
        #[doc = "Override the number of retries before a batch is dropped."]
        with_max_attempts,
        max_attempts,
        u32
    );

    fn from_policy(policy: &RetryPolicy) -> Self {
        Self {
            initial_delay_ms: Some(millis(policy.initial_delay)),
            max_delay_ms: Some(millis(policy.max_delay)),
            max_attempts: Some(policy.max_attempts),
        }
    }

    fn apply(&self, policy: &mut RetryPolicy) -> Result<(), ShipperBuildError> {
        if let Some(initial) = self.initial_delay_ms {
            policy.initial_delay = Duration::from_millis(ensure_positive!(
                initial,
                "retry initial_delay_ms"
            )?);
        }
        if let Some(max) = self.max_delay_ms {
            policy.max_delay = Duration::from_millis(ensure_positive!(max, "retry max_delay_ms")?);
        }
        if let Some(attempts) = self.max_attempts {
            policy.max_attempts = ensure_positive!(attempts, "retry max_attempts")?;
        }
        if policy.max_delay < policy.initial_delay {
            return Err(ShipperBuildError::InvalidConfig(format!(
                "retry max_delay ({:?}) must not be shorter than initial_delay ({:?})",
                policy.max_delay, policy.initial_delay
            )));
        }
        Ok(())
    }
}

/// Builder for constructing [`LogShipper`] instances.
#[derive(Clone, Debug, Default)]
pub struct LogShipperBuilder {
    workspace_id: Option<String>,
    workspace_secret: Option<String>,
    log_type: Option<String>,
    metadata: BTreeMap<String, String>,
    ingestion_host: Option<String>,
    endpoint: Option<String>,
    timeout_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    retry: RetryOverrides,
    retry_capacity: Option<usize>,
    warn_interval_ms: Option<u64>,
    clock: Option<SharedClock>,
    transport: Option<SharedTransport>,
}

impl LogShipperBuilder {
    /// Create a new builder with no workspace configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a builder from a loaded configuration.
    pub fn from_config(config: ShipperConfig) -> Self {
        Self {
            workspace_id: Some(config.workspace_id),
            workspace_secret: Some(config.workspace_secret),
            log_type: Some(config.log_type),
            metadata: config.metadata,
            ingestion_host: Some(config.ingestion_host),
            endpoint: config.endpoint,
            timeout_ms: Some(millis(config.request_timeout)),
            connect_timeout_ms: Some(millis(config.connect_timeout)),
            retry: RetryOverrides::from_policy(&config.retry),
            retry_capacity: Some(config.retry_capacity),
            warn_interval_ms: Some(millis(config.warn_interval)),
            clock: None,
            transport: None,
        }
    }

    /// Set the workspace identifier (required).
    pub fn with_workspace_id(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// Set the base64 encoded shared key (required).
    pub fn with_workspace_secret(mut self, secret: impl Into<String>) -> Self {
        self.workspace_secret = Some(secret.into());
        self
    }

    /// Set the `Log-Type` header value (required).
    pub fn with_log_type(mut self, log_type: impl Into<String>) -> Self {
        self.log_type = Some(log_type.into());
        self
    }

    /// Replace the static fields merged into every record.
    pub fn with_metadata<I, K, V>(mut self, metadata: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata = metadata
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Add a single static field.
    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Post to this URL instead of the one derived from the workspace id.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the host suffix used to derive the ingestion URL.
    pub fn with_ingestion_host(mut self, host: impl Into<String>) -> Self {
        self.ingestion_host = Some(host.into());
        self
    }

    option_setter!(
        #[doc = "Set the overall request timeout in milliseconds."]
        with_timeout_ms,
        timeout_ms,
        u64
    );
    option_setter!(
        #[doc = "Set the connect timeout in milliseconds."]
        with_connect_timeout_ms,
        connect_timeout_ms,
        u64
    );
    option_setter!(
        #[doc = "Set the bounded channel capacity of the retry worker."]
        with_retry_capacity,
        retry_capacity,
        usize
    );
    option_setter!(
        #[doc = "Set the minimum interval between dropped-retry warnings in milliseconds. Zero reports every drop."]
        with_warn_interval_ms,
        warn_interval_ms,
        u64
    );

    /// Override retry timings using the provided overrides.
    pub fn with_retry(mut self, overrides: RetryOverrides) -> Self {
        self.retry = overrides;
        self
    }

    /// Use `clock` for record timestamps and the signed date header.
    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Some(SharedClock::new(clock));
        self
    }

    /// Post through `transport` instead of the default HTTPS agent.
    pub fn with_transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Some(SharedTransport::new(transport));
        self
    }

    fn validate(&self) -> Result<(), ShipperBuildError> {
        self.validate_workspace_id()?;
        self.validate_log_type()?;
        self.validate_endpoint()?;
        self.validate_timeouts()?;
        if let Some(capacity) = self.retry_capacity {
            ensure_positive!(capacity, "retry_capacity")?;
        }
        Ok(())
    }

    fn validate_workspace_id(&self) -> Result<(), ShipperBuildError> {
        let Some(id) = self.workspace_id.as_deref() else {
            return Err(ShipperBuildError::InvalidConfig(
                "log shipper requires a workspace id".into(),
            ));
        };
        if id.is_empty() {
            return Err(ShipperBuildError::InvalidConfig(
                "workspace id must not be empty".into(),
            ));
        }
        let valid_chars = id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid_chars
            || id.len() > MAX_DNS_LABEL_LEN
            || id.starts_with('-')
            || id.ends_with('-')
        {
            return Err(ShipperBuildError::InvalidConfig(format!(
                "workspace id '{id}' is not a valid host label"
            )));
        }
        Ok(())
    }

    fn validate_log_type(&self) -> Result<(), ShipperBuildError> {
        match self.log_type.as_deref() {
            None => Err(ShipperBuildError::InvalidConfig(
                "log shipper requires a log type".into(),
            )),
            Some("") => Err(ShipperBuildError::InvalidConfig(
                "log type must not be empty".into(),
            )),
            Some(log_type) if log_type.chars().count() > MAX_LOG_TYPE_LEN => {
                Err(ShipperBuildError::InvalidConfig(format!(
                    "log type must be at most {MAX_LOG_TYPE_LEN} characters"
                )))
            }
            Some(log_type)
                if !log_type
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_') =>
            {
                Err(ShipperBuildError::InvalidConfig(format!(
                    "log type '{log_type}' may only contain letters, digits and underscores"
                )))
            }
            Some(_) => Ok(()),
        }
    }

    fn validate_endpoint(&self) -> Result<(), ShipperBuildError> {
        match self.endpoint.as_deref() {
            Some(endpoint) if endpoint.trim().is_empty() => Err(
                ShipperBuildError::InvalidConfig("endpoint must not be empty".into()),
            ),
            _ => Ok(()),
        }
    }

    fn validate_timeouts(&self) -> Result<(), ShipperBuildError> {
        if let Some(timeout) = self.timeout_ms {
            ensure_positive!(timeout, "timeout_ms")?;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        Ok(())
    }

    fn build_config(&self) -> Result<ShipperConfig, ShipperBuildError> {
        self.validate()?;

        let defaults = ShipperConfig::default();
        let mut config = ShipperConfig {
            workspace_id: self.workspace_id.clone().unwrap_or_default(),
            workspace_secret: self.workspace_secret.clone().ok_or_else(|| {
                ShipperBuildError::InvalidConfig("log shipper requires a workspace secret".into())
            })?,
            log_type: self.log_type.clone().unwrap_or_default(),
            metadata: self.metadata.clone(),
            ingestion_host: self
                .ingestion_host
                .clone()
                .unwrap_or(defaults.ingestion_host),
            endpoint: self.endpoint.clone(),
            request_timeout: self
                .timeout_ms
                .map_or(defaults.request_timeout, Duration::from_millis),
            connect_timeout: self
                .connect_timeout_ms
                .map_or(defaults.connect_timeout, Duration::from_millis),
            retry: defaults.retry,
            retry_capacity: self.retry_capacity.unwrap_or(defaults.retry_capacity),
            warn_interval: self
                .warn_interval_ms
                .map_or(defaults.warn_interval, Duration::from_millis),
        };

        self.retry.apply(&mut config.retry)?;
        Ok(config)
    }

    /// Validate the configuration and start the shipper.
    ///
    /// # Errors
    ///
    /// * [`ShipperBuildError::InvalidConfig`] for missing or malformed values.
    /// * [`ShipperBuildError::InvalidSecret`] / [`ShipperBuildError::EmptySecret`]
    ///   when the secret does not decode to a usable key.
    /// * [`ShipperBuildError::Tls`] if the default HTTPS agent cannot be built.
    /// * [`ShipperBuildError::Io`] if the retry worker thread cannot be spawned.
    pub fn build(&self) -> Result<LogShipper, ShipperBuildError> {
        let config = self.build_config()?;
        let key = SigningKey::from_base64(&config.workspace_secret)?;
        let transport = match &self.transport {
            Some(transport) => transport.clone(),
            None => SharedTransport::new(UreqTransport::new(
                config.connect_timeout,
                config.request_timeout,
            )?),
        };
        let clock = self.clock.clone().unwrap_or_default();
        LogShipper::from_parts(config, key, transport, clock)
    }
}
