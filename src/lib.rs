//! Client for the log-analytics HTTP data collector API.
//!
//! [`LogShipper`] turns application messages into JSON records, signs each
//! batch with the workspace shared key (HMAC-SHA256 over a canonical request
//! description) and posts it to the workspace ingestion endpoint. Batches the
//! endpoint rejects are re-posted in the background by a bounded retry
//! worker.
//!
//! ```no_run
//! use loganalytics_shipper::LogShipper;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let shipper = LogShipper::new("my-workspace", "c2VjcmV0LWtleQ==", "AppLogs", None)?;
//! shipper.post_messages(&["service started"], None)?;
//! shipper.close();
//! # Ok(())
//! # }
//! ```

mod clock;
mod config;
mod dispatch;
mod error;
mod rate_limited_warner;
mod record;
mod request;
mod retry;
mod serialise;
mod shipper;
mod signer;
mod transport;

#[cfg(test)]
mod test_utils;

pub use clock::{Clock, SharedClock, SystemClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use config::{
    API_VERSION, DEFAULT_INGESTION_HOST, RetryPolicy, ShipperConfig, ingestion_url,
};
pub use dispatch::SUCCESS_STATUS;
pub use error::{DeliveryError, RetryQueueError, ShipperBuildError};
pub use record::{MESSAGE_KEY, ShipperRecord, TIMESTAMP_KEY, build_records, format_timestamp};
pub use request::{SignedRequest, format_date_header};
pub use serialise::serialise_batch;
pub use shipper::{LogShipper, LogShipperBuilder, RetryOverrides};
pub use signer::{SigningKey, authorization_header, sign, string_to_sign};
pub use transport::{Transport, TransportError, TransportResponse, UreqTransport};
#[cfg(any(test, feature = "test-util"))]
pub use transport::{ScriptedTransport, SentRequest};
