//! Shared-key request signing.
//!
//! The ingestion API authenticates a request by recomputing an HMAC-SHA256
//! over a canonical string built from five request attributes. The string
//! must match the server's reconstruction character for character, so it is
//! assembled here and nowhere else.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ShipperBuildError;

type HmacSha256 = Hmac<Sha256>;

/// HTTP method covered by the signature.
pub const SIGNED_METHOD: &str = "POST";
/// Content type covered by the signature and sent on every request.
pub const CONTENT_TYPE: &str = "application/json";
/// Resource path covered by the signature, independent of the query string.
pub const SIGNED_RESOURCE: &str = "/api/logs";
/// Header carrying the request date.
pub const DATE_HEADER: &str = "x-ms-date";

/// Workspace shared key, held as a keyed HMAC-SHA256 state ready to sign.
#[derive(Clone)]
pub struct SigningKey {
    mac: HmacSha256,
    len: usize,
}

impl SigningKey {
    /// Decode a base64 workspace secret.
    ///
    /// # Errors
    ///
    /// Returns [`ShipperBuildError::InvalidSecret`] when the secret is not
    /// valid standard base64 and [`ShipperBuildError::EmptySecret`] when it
    /// decodes to zero bytes.
    pub fn from_base64(secret: &str) -> Result<Self, ShipperBuildError> {
        let bytes = BASE64_STANDARD.decode(secret.trim())?;
        Self::from_bytes(bytes)
    }

    /// Key the signer with raw secret bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ShipperBuildError::EmptySecret`] for an empty key.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self, ShipperBuildError> {
        let bytes = bytes.as_ref();
        if bytes.is_empty() {
            return Err(ShipperBuildError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(bytes).map_err(|err| {
            ShipperBuildError::InvalidConfig(format!("unusable signing key: {err}"))
        })?;
        Ok(Self {
            mac,
            len: bytes.len(),
        })
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey(<{} bytes redacted>)", self.len)
    }
}

/// Build the canonical string to sign for a body of `content_length` bytes
/// sent with the given `x-ms-date` value.
pub fn string_to_sign(content_length: usize, date: &str) -> String {
    format!(
        "{SIGNED_METHOD}\n{content_length}\n{CONTENT_TYPE}\n{DATE_HEADER}:{date}\n{SIGNED_RESOURCE}"
    )
}

/// Compute the base64 HMAC-SHA256 signature of `string_to_sign`.
pub fn sign(string_to_sign: &str, key: &SigningKey) -> String {
    let mut mac = key.mac.clone();
    mac.update(string_to_sign.as_bytes());
    BASE64_STANDARD.encode(mac.finalize().into_bytes())
}

/// Format the `Authorization` header value for a signature.
pub fn authorization_header(workspace_id: &str, signature: &str) -> String {
    format!("SharedKey {workspace_id}:{signature}")
}
