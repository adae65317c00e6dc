//! Loading shipper configuration from INI files on disk.

use std::{io::Write, sync::Arc, time::Duration};

use loganalytics_shipper::{
    LogShipperBuilder, ScriptedTransport, ShipperBuildError, ShipperConfig,
};
use rstest::rstest;
use tempfile::NamedTempFile;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(text.as_bytes()).expect("write config");
    file.flush().expect("flush config");
    file
}

#[rstest]
fn file_configures_a_working_shipper() {
    let file = write_config(
        "\
[workspace]
id = ws-file
secret = c2VjcmV0LWtleQ==
log_type = FileLogs

[metadata]
env = staging
region = westeurope

[retry]
initial_delay_ms = 250
max_delay_ms = 1000
max_attempts = 2
capacity = 16
",
    );
    let config = ShipperConfig::from_ini_file(file.path()).expect("config loads");
    assert_eq!(config.workspace_id, "ws-file");
    assert_eq!(config.retry.initial_delay, Duration::from_millis(250));
    assert_eq!(config.retry_capacity, 16);

    let transport = Arc::new(ScriptedTransport::default());
    let shipper = LogShipperBuilder::from_config(config)
        .with_transport(Arc::clone(&transport))
        .build()
        .expect("shipper builds");
    assert_eq!(
        shipper.url(),
        "https://ws-file.ods.opinsights.azure.com/api/logs?api-version=2016-04-01"
    );
    shipper.post_message("from file", None).expect("accepted");

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].header("Log-Type"), Some("FileLogs"));
    let body: serde_json::Value = serde_json::from_slice(&sent[0].body).expect("json body");
    assert_eq!(body[0]["env"], "staging");
    assert_eq!(body[0]["region"], "westeurope");
    assert_eq!(body[0]["message"], "from file");
}

#[rstest]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("absent.ini");
    let err = ShipperConfig::from_ini_file(&path).expect_err("missing file");
    assert!(matches!(err, ShipperBuildError::Io(_)));
    assert!(err.to_string().contains("doesn't exist"));
}

#[rstest]
fn empty_file_is_rejected() {
    let file = write_config("   \n");
    let err = ShipperConfig::from_ini_file(file.path()).expect_err("empty file");
    assert!(matches!(err, ShipperBuildError::Ini(_)));
}

#[rstest]
fn bad_secret_in_file_fails_build() {
    let file = write_config(
        "\
[workspace]
id = ws-file
secret = %%%
log_type = FileLogs
",
    );
    let config = ShipperConfig::from_ini_file(file.path()).expect("config loads");
    let err = LogShipperBuilder::from_config(config)
        .with_transport(ScriptedTransport::default())
        .build()
        .expect_err("secret is not base64");
    assert!(matches!(err, ShipperBuildError::InvalidSecret(_)));
}
