//! The single delivery path shared by callers and the retry worker.
//!
//! Every attempt signs the body with a freshly read date so retries that fire
//! long after the original call are still inside the service's clock-skew
//! window.

use std::sync::Arc;

use log::debug;

use crate::clock::SharedClock;
use crate::error::DeliveryError;
use crate::request::SignedRequest;
use crate::signer::SigningKey;
use crate::transport::SharedTransport;

/// The only status the ingestion API returns for an accepted batch.
pub const SUCCESS_STATUS: u16 = 200;

/// Identity and collaborators needed to sign and send a batch.
#[derive(Debug)]
pub struct Dispatcher {
    url: String,
    workspace_id: String,
    log_type: String,
    key: SigningKey,
    transport: SharedTransport,
    clock: SharedClock,
}

impl Dispatcher {
    pub fn new(
        url: String,
        workspace_id: String,
        log_type: String,
        key: SigningKey,
        transport: SharedTransport,
        clock: SharedClock,
    ) -> Self {
        Self {
            url,
            workspace_id,
            log_type,
            key,
            transport,
            clock,
        }
    }

    /// Ingestion URL requests are sent to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Workspace identifier used as the signature key id.
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Value of the `Log-Type` header.
    pub fn log_type(&self) -> &str {
        &self.log_type
    }

    /// Clock shared with the shipper.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Sign `body` as of now and build the request.
    pub fn sign(&self, body: Arc<[u8]>) -> SignedRequest {
        let now = self.clock.now();
        SignedRequest::new(
            &self.url,
            &self.workspace_id,
            &self.log_type,
            &self.key,
            body,
            &now,
        )
    }

    /// Sign and POST `body` once.
    ///
    /// # Errors
    ///
    /// * [`DeliveryError::Transport`] if no response was received.
    /// * [`DeliveryError::HttpStatus`] if the response status is not 200.
    pub fn deliver(&self, body: &Arc<[u8]>) -> Result<(), DeliveryError> {
        let request = self.sign(Arc::clone(body));
        debug!(
            "LogShipper posting {} bytes to {}",
            request.body().len(),
            request.url()
        );
        let response = self
            .transport
            .post(&request)
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        if response.status == SUCCESS_STATUS {
            Ok(())
        } else {
            Err(DeliveryError::HttpStatus {
                status: response.status,
                body: response.body,
            })
        }
    }
}
