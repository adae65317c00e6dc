//! Zero-copy log records for ingestion payloads.
//!
//! A record is the static metadata of the shipper plus the two per-message
//! keys `message` and `Timestamp`. Records borrow from the shipper's metadata
//! map and the caller's message so building a batch does not clone the
//! metadata once per message.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

/// Key carrying the log text.
pub const MESSAGE_KEY: &str = "message";
/// Key carrying the RFC3339 timestamp; also named by `time-generated-field`.
pub const TIMESTAMP_KEY: &str = "Timestamp";

/// Format an instant as RFC3339 with second precision and a `Z` suffix.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Serializable view of a single log record.
///
/// Metadata entries named [`MESSAGE_KEY`] or [`TIMESTAMP_KEY`] are shadowed
/// by the per-record values, so each key appears exactly once in the output.
#[derive(Debug, Clone, Copy)]
pub struct ShipperRecord<'a> {
    metadata: &'a BTreeMap<String, String>,
    message: &'a str,
    timestamp: &'a str,
}

impl<'a> ShipperRecord<'a> {
    /// Build a record from shared metadata, the message and a formatted
    /// timestamp.
    pub fn new(
        metadata: &'a BTreeMap<String, String>,
        message: &'a str,
        timestamp: &'a str,
    ) -> Self {
        Self {
            metadata,
            message,
            timestamp,
        }
    }

    /// The log text carried by this record.
    pub fn message(&self) -> &str {
        self.message
    }

    fn metadata_entries(&self) -> impl Iterator<Item = (&'a String, &'a String)> {
        self.metadata
            .iter()
            .filter(|(k, _)| k.as_str() != MESSAGE_KEY && k.as_str() != TIMESTAMP_KEY)
    }

    /// Count the total number of fields that will be serialized.
    fn count_fields(&self) -> usize {
        2 + self.metadata_entries().count()
    }
}

impl Serialize for ShipperRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.count_fields()))?;
        for (k, v) in self.metadata_entries() {
            map.serialize_entry(k, v)?;
        }
        map.serialize_entry(MESSAGE_KEY, self.message)?;
        map.serialize_entry(TIMESTAMP_KEY, self.timestamp)?;
        map.end()
    }
}

/// Build one record per message, preserving input order.
pub fn build_records<'a, M>(
    metadata: &'a BTreeMap<String, String>,
    messages: &'a [M],
    timestamp: &'a str,
) -> Vec<ShipperRecord<'a>>
where
    M: AsRef<str>,
{
    messages
        .iter()
        .map(|m| ShipperRecord::new(metadata, m.as_ref(), timestamp))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn metadata() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("host".to_string(), "node-1".to_string()),
            ("service".to_string(), "billing".to_string()),
        ])
    }

    #[rstest]
    fn timestamp_uses_seconds_and_zulu() {
        let ts = Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();
        assert_eq!(format_timestamp(&ts), "2006-01-02T15:04:05Z");
    }

    #[rstest]
    fn timestamp_drops_subsecond_precision() {
        let ts = Utc.timestamp_opt(1_700_000_000, 987_654_321).unwrap();
        assert_eq!(format_timestamp(&ts), "2023-11-14T22:13:20Z");
    }

    #[rstest]
    fn record_merges_metadata_with_message(metadata: BTreeMap<String, String>) {
        let record = ShipperRecord::new(&metadata, "hello", "2006-01-02T15:04:05Z");
        let map: BTreeMap<String, String> =
            serde_json::from_value(serde_json::to_value(record).expect("serialise"))
                .expect("flat string map");
        assert_eq!(map.len(), 4);
        assert_eq!(map["host"], "node-1");
        assert_eq!(map["service"], "billing");
        assert_eq!(map[MESSAGE_KEY], "hello");
        assert_eq!(map[TIMESTAMP_KEY], "2006-01-02T15:04:05Z");
    }

    #[rstest]
    fn per_record_keys_shadow_metadata() {
        let metadata = BTreeMap::from([
            (MESSAGE_KEY.to_string(), "stale".to_string()),
            (TIMESTAMP_KEY.to_string(), "yesterday".to_string()),
        ]);
        let record = ShipperRecord::new(&metadata, "fresh", "2006-01-02T15:04:05Z");
        let json = serde_json::to_value(record).expect("serialise");
        let object = json.as_object().expect("object");
        assert_eq!(object.len(), 2);
        assert_eq!(object[MESSAGE_KEY], "fresh");
        assert_eq!(object[TIMESTAMP_KEY], "2006-01-02T15:04:05Z");
    }

    #[rstest]
    fn records_follow_input_order(metadata: BTreeMap<String, String>) {
        let messages = ["first", "second", "third"];
        let records = build_records(&metadata, &messages, "ts");
        let texts: Vec<&str> = records.iter().map(ShipperRecord::message).collect();
        assert_eq!(texts, messages);
    }

    proptest! {
        #[test]
        fn record_keys_are_metadata_plus_two(
            metadata in proptest::collection::btree_map("k_[a-z]{1,8}", ".*", 0..8),
            text in ".*",
        ) {
            let record = ShipperRecord::new(&metadata, &text, "2006-01-02T15:04:05Z");
            let json = serde_json::to_value(record).expect("serialise");
            let object = json.as_object().expect("object");
            prop_assert_eq!(object.len(), metadata.len() + 2);
            for key in metadata.keys() {
                prop_assert!(object.contains_key(key));
            }
            prop_assert_eq!(object[MESSAGE_KEY].as_str(), Some(text.as_str()));
        }
    }
}
