//! JSON body encoding for record batches.

use serde::Serialize;

use crate::error::DeliveryError;
use crate::record::ShipperRecord;

/// Serialise a batch of records to the JSON array sent as the request body.
///
/// # Errors
///
/// Returns [`DeliveryError::Serialization`] if encoding fails. String maps
/// always encode, so this indicates a logic error upstream.
pub fn serialise_batch(records: &[ShipperRecord<'_>]) -> Result<Vec<u8>, DeliveryError> {
    serialise_json(records)
}

fn serialise_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, DeliveryError> {
    serde_json::to_vec(value).map_err(|err| DeliveryError::Serialization(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{TIMESTAMP_KEY, build_records};
    use rstest::rstest;
    use std::collections::BTreeMap;

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(25)]
    fn produces_one_object_per_message(#[case] count: usize) {
        let metadata = BTreeMap::from([("env".to_string(), "prod".to_string())]);
        let messages: Vec<String> = (0..count).map(|i| format!("message {i}")).collect();
        let records = build_records(&metadata, &messages, "2006-01-02T15:04:05Z");

        let body = serialise_batch(&records).expect("serialise");
        let parsed: Vec<BTreeMap<String, String>> =
            serde_json::from_slice(&body).expect("valid JSON array of string maps");

        assert_eq!(parsed.len(), count);
        for (i, record) in parsed.iter().enumerate() {
            assert_eq!(record.len(), 3);
            assert_eq!(record["env"], "prod");
            assert_eq!(record["message"], format!("message {i}"));
            assert_eq!(record[TIMESTAMP_KEY], "2006-01-02T15:04:05Z");
        }
    }

    #[rstest]
    fn escapes_control_characters() {
        let metadata = BTreeMap::new();
        let messages = ["line one\nline \"two\""];
        let records = build_records(&metadata, &messages, "ts");
        let body = serialise_batch(&records).expect("serialise");
        let text = String::from_utf8(body).expect("utf-8");
        assert_eq!(
            text,
            r#"[{"message":"line one\nline \"two\"","Timestamp":"ts"}]"#
        );
    }
}
