//! Log shipper for the log-analytics data collector API.
//!
//! This module defines [`LogShipper`], which turns application messages into
//! JSON records, signs each request with the workspace shared key and posts
//! it to the ingestion endpoint. Calls are synchronous: `post_messages`
//! returns once the endpoint has answered or the request timeout elapsed.
//!
//! # Delivery Semantics
//!
//! - **200**: Success.
//! - **Any other status**: The error is returned to the caller and the same
//!   batch is handed to the retry worker, which re-posts it after
//!   [`RetryPolicy::initial_delay`](crate::RetryPolicy) and backs off from
//!   there.
//! - **Transport errors**: Returned to the caller; no retry is scheduled.

mod builder;


use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::{
    clock::SharedClock,
    config::ShipperConfig,
    dispatch::Dispatcher,
    error::{DeliveryError, ShipperBuildError},
    record::{build_records, format_timestamp},
    retry::{RetryJob, RetryWorker},
    serialise::serialise_batch,
    signer::SigningKey,
    transport::SharedTransport,
};

pub use builder::{LogShipperBuilder, RetryOverrides};

/// Client posting log messages to a single workspace.
///
/// `LogShipper` is `Send + Sync`; share it behind an `Arc` to post from
/// several threads. All calls reuse one HTTP connection pool.
pub struct LogShipper {
    metadata: BTreeMap<String, String>,
    dispatcher: Arc<Dispatcher>,
    retry: RetryWorker,
    request_timeout: Duration,
}

impl LogShipper {
    /// Create a shipper for the public-cloud endpoint of `workspace_id`.
    ///
    /// `metadata` is merged into every record; `None` means no static fields.
    ///
    /// # Errors
    ///
    /// Fails if the secret is not valid base64, an argument is invalid, or the
    /// HTTP agent or retry worker cannot be created.
    pub fn new(
        workspace_id: impl Into<String>,
        workspace_secret: impl Into<String>,
        log_type: impl Into<String>,
        metadata: Option<HashMap<String, String>>,
    ) -> Result<Self, ShipperBuildError> {
        LogShipperBuilder::new()
            .with_workspace_id(workspace_id)
            .with_workspace_secret(workspace_secret)
            .with_log_type(log_type)
            .with_metadata(metadata.unwrap_or_default())
            .build()
    }

    /// Create a shipper from a loaded configuration.
    ///
    /// # Errors
    ///
    /// See [`LogShipperBuilder::build`].
    pub fn from_config(config: ShipperConfig) -> Result<Self, ShipperBuildError> {
        LogShipperBuilder::from_config(config).build()
    }

    fn from_parts(
        config: ShipperConfig,
        key: SigningKey,
        transport: SharedTransport,
        clock: SharedClock,
    ) -> Result<Self, ShipperBuildError> {
        let dispatcher = Arc::new(Dispatcher::new(
            config.url(),
            config.workspace_id,
            config.log_type,
            key,
            transport,
            clock,
        ));
        let retry = RetryWorker::spawn(
            Arc::clone(&dispatcher),
            config.retry,
            config.retry_capacity,
            config.warn_interval,
            config.request_timeout,
        )?;
        Ok(Self {
            metadata: config.metadata,
            dispatcher,
            retry,
            request_timeout: config.request_timeout,
        })
    }

    /// Post a single message. See [`Self::post_messages`].
    ///
    /// # Errors
    ///
    /// See [`Self::post_messages`].
    pub fn post_message(
        &self,
        message: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<(), DeliveryError> {
        self.post_messages(&[message], timestamp)
    }

    /// Post a batch of messages as one request.
    ///
    /// Every record carries the shipper metadata, the message text and
    /// `timestamp` (the current instant when `None`) in RFC3339. An empty
    /// batch is accepted without contacting the endpoint.
    ///
    /// # Errors
    ///
    /// * [`DeliveryError::Transport`] - no response was received; not retried.
    /// * [`DeliveryError::HttpStatus`] - the endpoint rejected the batch; a
    ///   retry has been scheduled in the background.
    /// * [`DeliveryError::Serialization`] - the batch could not be encoded.
    pub fn post_messages<M>(
        &self,
        messages: &[M],
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<(), DeliveryError>
    where
        M: AsRef<str>,
    {
        if messages.is_empty() {
            debug!("LogShipper ignoring empty batch");
            return Ok(());
        }
        let timestamp = timestamp.unwrap_or_else(|| self.dispatcher.clock().now());
        let formatted = format_timestamp(&timestamp);
        let records = build_records(&self.metadata, messages, &formatted);
        let body: Arc<[u8]> = serialise_batch(&records)?.into();

        match self.dispatcher.deliver(&body) {
            Ok(()) => {
                info!("LogShipper posted {} messages", messages.len());
                Ok(())
            }
            Err(err @ DeliveryError::HttpStatus { .. }) => {
                match self.retry.schedule(RetryJob::new(body, messages.len())) {
                    Ok(()) => debug!("LogShipper scheduled retry of {} messages", messages.len()),
                    Err(queue_err) => {
                        warn!("LogShipper could not schedule retry: {queue_err}");
                    }
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Number of rejected batches still waiting to be retried.
    pub fn pending_retries(&self) -> usize {
        self.retry.pending()
    }

    /// Wait until the retry worker has taken every rejected batch so far.
    ///
    /// This does not wait for delayed retries to be attempted; use
    /// [`Self::close`] for that.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.retry.flush(timeout)
    }

    /// Shut down the retry worker, giving each pending batch one final
    /// immediate attempt.
    ///
    /// Returns `false` if the worker did not finish within the request
    /// timeout. Further rejected batches are no longer retried.
    pub fn close(&self) -> bool {
        self.retry.close()
    }

    /// URL requests are posted to.
    pub fn url(&self) -> &str {
        self.dispatcher.url()
    }

    /// Workspace identifier.
    pub fn workspace_id(&self) -> &str {
        self.dispatcher.workspace_id()
    }

    /// Value of the `Log-Type` header.
    pub fn log_type(&self) -> &str {
        self.dispatcher.log_type()
    }

    /// Static fields merged into every record.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

impl std::fmt::Debug for LogShipper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogShipper")
            .field("url", &self.url())
            .field("log_type", &self.log_type())
            .field("metadata", &self.metadata)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}
