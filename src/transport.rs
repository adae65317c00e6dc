//! HTTP transport used to deliver signed requests.
//!
//! [`Transport`] is the seam between the delivery protocol and the HTTP
//! client. [`UreqTransport`] is the production implementation; it owns a
//! single `ureq::Agent` whose connection pool is shared by every caller and
//! by the retry worker.

use std::{fmt, io::Read, sync::Arc, time::Duration};

use native_tls::TlsConnector;
use thiserror::Error;
use ureq::{Agent, AgentBuilder};

use crate::error::ShipperBuildError;
use crate::request::SignedRequest;

/// Upper bound on the number of response body bytes kept for diagnostics.
pub const MAX_RESPONSE_BODY: u64 = 64 * 1024;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    /// Create a response value.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// The request could not be sent or no response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Issues POST requests on behalf of the shipper.
///
/// Implementations must be safe for concurrent use: the same transport serves
/// every `post_messages` call and the retry worker.
pub trait Transport: Send + Sync {
    /// POST the signed request and return whatever status came back.
    ///
    /// Non-2xx statuses are responses, not errors; only failures to obtain a
    /// response are reported through [`TransportError`].
    fn post(&self, request: &SignedRequest) -> Result<TransportResponse, TransportError>;
}

/// Shared transport trait object.
#[derive(Clone)]
pub struct SharedTransport {
    inner: Arc<dyn Transport>,
}

impl SharedTransport {
    /// Wrap an owned transport implementation.
    pub fn new<T>(transport: T) -> Self
    where
        T: Transport + 'static,
    {
        Self {
            inner: Arc::new(transport),
        }
    }

    /// Forward to the wrapped transport.
    pub fn post(&self, request: &SignedRequest) -> Result<TransportResponse, TransportError> {
        self.inner.post(request)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn post(&self, request: &SignedRequest) -> Result<TransportResponse, TransportError> {
        (**self).post(request)
    }
}

impl fmt::Debug for SharedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTransport").finish_non_exhaustive()
    }
}

/// Transport backed by a pooled `ureq` agent using the platform TLS stack.
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    /// Build an agent with the given connect and overall request timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ShipperBuildError::Tls`] if the platform TLS connector cannot
    /// be initialised.
    pub fn new(connect_timeout: Duration, timeout: Duration) -> Result<Self, ShipperBuildError> {
        let connector =
            TlsConnector::new().map_err(|err| ShipperBuildError::Tls(err.to_string()))?;
        let agent = AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout(timeout)
            .tls_connector(Arc::new(connector))
            .build();
        Ok(Self { agent })
    }
}

impl Transport for UreqTransport {
    fn post(&self, request: &SignedRequest) -> Result<TransportResponse, TransportError> {
        let mut req = self.agent.post(request.url());
        for (key, value) in request.headers() {
            req = req.set(key, value);
        }
        match req.send_bytes(request.body()) {
            Ok(response) => {
                let status = response.status();
                Ok(TransportResponse::new(status, read_body(response)))
            }
            Err(ureq::Error::Status(status, response)) => {
                Ok(TransportResponse::new(status, read_body(response)))
            }
            Err(ureq::Error::Transport(err)) => Err(TransportError(err.to_string())),
        }
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

/// Read the response body for diagnostics; an unreadable body is reported as
/// empty rather than masking the status.
fn read_body(response: ureq::Response) -> String {
    let mut buf = Vec::new();
    if let Err(err) = response
        .into_reader()
        .take(MAX_RESPONSE_BODY)
        .read_to_end(&mut buf)
    {
        log::debug!("LogShipper could not read response body: {err}");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(any(test, feature = "test-util"))]
mod scripted {
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::{Transport, TransportError, TransportResponse};
    use crate::request::SignedRequest;

    /// Captured copy of a request seen by [`ScriptedTransport`].
    #[derive(Debug, Clone)]
    pub struct SentRequest {
        pub url: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl SentRequest {
        /// Look up a header value by case-insensitive name.
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    /// In-memory transport replaying a fixed script of outcomes.
    ///
    /// Once the script is exhausted every further request receives 200.
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        sent: Mutex<Vec<SentRequest>>,
    }

    impl ScriptedTransport {
        /// Create a transport replaying `script` in order.
        pub fn new(
            script: impl IntoIterator<Item = Result<TransportResponse, TransportError>>,
        ) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                sent: Mutex::new(Vec::new()),
            }
        }

        /// Requests observed so far.
        pub fn sent(&self) -> Vec<SentRequest> {
            self.sent.lock().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn post(&self, request: &SignedRequest) -> Result<TransportResponse, TransportError> {
            self.sent.lock().push(SentRequest {
                url: request.url().to_string(),
                headers: request
                    .headers()
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), v.clone()))
                    .collect(),
                body: request.body().to_vec(),
            });
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(TransportResponse::new(200, "")))
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use scripted::{ScriptedTransport, SentRequest};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    use crate::signer::SigningKey;

    fn request() -> SignedRequest {
        request_to("https://ws.example/api/logs")
    }

    fn request_to(url: &str) -> SignedRequest {
        SignedRequest::new(
            url,
            "ws",
            "AppLogs",
            &SigningKey::from_bytes(b"key").expect("valid key"),
            Arc::from(&b"[]"[..]),
            &Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap(),
        )
    }

    #[rstest]
    fn scripted_transport_replays_then_defaults_to_ok() {
        let transport = ScriptedTransport::new([
            Ok(TransportResponse::new(503, "busy")),
            Err(TransportError("refused".into())),
        ]);
        assert_eq!(
            transport.post(&request()),
            Ok(TransportResponse::new(503, "busy"))
        );
        assert_eq!(
            transport.post(&request()),
            Err(TransportError("refused".into()))
        );
        assert_eq!(transport.post(&request()), Ok(TransportResponse::new(200, "")));
        assert_eq!(transport.sent().len(), 3);
        assert_eq!(transport.sent()[0].header("log-type"), Some("AppLogs"));
    }

    #[rstest]
    fn ureq_transport_reports_unreachable_host_as_transport_error() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let transport =
            UreqTransport::new(Duration::from_secs(1), Duration::from_secs(2)).expect("agent");
        let req = request_to(&format!("http://{addr}/api/logs"));
        assert!(transport.post(&req).is_err());
    }
}
