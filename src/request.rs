//! Assembly of signed ingestion requests.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::record::TIMESTAMP_KEY;
use crate::signer::{
    CONTENT_TYPE, DATE_HEADER, SigningKey, authorization_header, sign, string_to_sign,
};

/// Header naming the record type in the workspace.
pub const LOG_TYPE_HEADER: &str = "Log-Type";
/// Header naming the record field used as the ingestion time.
pub const TIME_GENERATED_HEADER: &str = "time-generated-field";

/// Format an instant as an RFC1123 date in GMT, e.g.
/// `Mon, 02 Jan 2006 15:04:05 GMT`.
pub fn format_date_header(now: &DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// A fully signed POST ready for the transport.
///
/// The body is shared so a retry can re-sign the same bytes without copying.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    url: String,
    body: Arc<[u8]>,
    headers: Vec<(&'static str, String)>,
}

impl SignedRequest {
    /// Sign `body` for delivery to `url` at the instant `now`.
    pub fn new(
        url: &str,
        workspace_id: &str,
        log_type: &str,
        key: &SigningKey,
        body: Arc<[u8]>,
        now: &DateTime<Utc>,
    ) -> Self {
        let date = format_date_header(now);
        let signature = sign(&string_to_sign(body.len(), &date), key);
        let headers = vec![
            (
                "Authorization",
                authorization_header(workspace_id, &signature),
            ),
            ("Content-Type", CONTENT_TYPE.to_string()),
            (LOG_TYPE_HEADER, log_type.to_string()),
            (DATE_HEADER, date),
            (TIME_GENERATED_HEADER, TIMESTAMP_KEY.to_string()),
        ];
        Self {
            url: url.to_string(),
            body,
            headers,
        }
    }

    /// Target URL including the `api-version` query.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Serialised JSON body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Headers in the order they are sent.
    pub fn headers(&self) -> &[(&'static str, String)] {
        &self.headers
    }

    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
