//! Error types surfaced by the shipper.
//!
//! Construction problems are reported through [`ShipperBuildError`] so a
//! misconfigured workspace fails loudly before any request is attempted.
//! Delivery problems are reported per call through [`DeliveryError`].

use std::io;

use thiserror::Error;

/// Errors that may occur while building a [`LogShipper`](crate::LogShipper).
#[derive(Debug, Error)]
pub enum ShipperBuildError {
    /// Invalid user supplied configuration.
    #[error("invalid shipper configuration: {0}")]
    InvalidConfig(String),
    /// The workspace secret is not valid base64.
    #[error("workspace secret is not valid base64: {0}")]
    InvalidSecret(#[from] base64::DecodeError),
    /// The workspace secret decoded to zero bytes.
    #[error("workspace secret must not be empty")]
    EmptySecret,
    /// The TLS connector backing the HTTP agent could not be created.
    #[error("failed to initialise TLS: {0}")]
    Tls(String),
    /// Malformed INI configuration.
    #[error("invalid configuration file: {0}")]
    Ini(String),
    /// Underlying I/O error whilst reading configuration.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors returned to the caller of
/// [`LogShipper::post_messages`](crate::LogShipper::post_messages).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The request could not be sent or no response arrived. Never retried.
    #[error("failed to post request: {0}")]
    Transport(String),
    /// The endpoint answered with a status other than 200. A retry has been
    /// scheduled for the same batch.
    #[error("post log request failed with status: {status} {body}")]
    HttpStatus { status: u16, body: String },
    /// The batch could not be encoded as JSON.
    #[error("failed to serialise log batch: {0}")]
    Serialization(String),
}

impl DeliveryError {
    /// Whether this failure leads to a scheduled retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::HttpStatus { .. })
    }
}

/// Errors raised when handing a job to the retry worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RetryQueueError {
    /// The queue is at capacity and the job was dropped.
    #[error("retry queue is full")]
    QueueFull,
    /// The worker has shut down and the job was dropped.
    #[error("retry worker has shut down")]
    Closed,
}
