// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use std::io::Write;
use yare::parameterized;

fn target(url: Option<&str>) -> TargetArgs {
    TargetArgs {
        url: url.map(str::to_string),
    }
}

#[test]
fn flag_overrides_config() {
    let config = ClientConfig {
        url: Some("ws://from-config:1".to_string()),
        ..ClientConfig::default()
    };
    let url = resolve_url(&target(Some("wss://flag:2")), &config).unwrap();
    assert_eq!(url, "wss://flag:2");
}

#[test]
fn config_url_is_fallback() {
    let config = ClientConfig {
        url: Some("ws://from-config:1".to_string()),
        ..ClientConfig::default()
    };
    assert_eq!(resolve_url(&target(None), &config).unwrap(), "ws://from-config:1");
}

#[test]
fn missing_url() {
    let err = resolve_url(&target(None), &ClientConfig::default()).unwrap_err();
    assert!(matches!(err, Error::MissingUrl));
}

#[test]
fn http_url_is_rejected() {
    let err = resolve_url(&target(Some("http://h:1")), &ClientConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Client(tether::Error::Config(_))));
}

#[parameterized(
    absent = { None, None },
    object = { Some(r#"{"sessionId":"s1"}"#), Some(json!({"sessionId": "s1"})) },
    string = { Some(r#""hi""#), Some(json!("hi")) },
)]
fn params(raw: Option<&str>, expected: Option<Value>) {
    assert_eq!(parse_params(raw).unwrap(), expected);
}

#[test]
fn malformed_params() {
    assert!(matches!(
        parse_params(Some("{sessionId")),
        Err(Error::InvalidParams(_))
    ));
}

#[test]
fn load_config_reads_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "url = \"ws://127.0.0.1:9\"\nmax_attempts = 4").unwrap();
    let config = load_config(Some(file.path())).unwrap();
    assert_eq!(config.url.as_deref(), Some("ws://127.0.0.1:9"));
    assert_eq!(config.max_attempts, 4);
}

#[test]
fn load_config_missing_file_is_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(Some(dir.path().join("absent.toml").as_path())).unwrap();
    assert_eq!(config, ClientConfig::default());
}
