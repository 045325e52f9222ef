#![allow(clippy::unwrap_used)]
// Integration tests for file loading, defaults and validation.

use std::path::PathBuf;
use std::time::Duration;

use pretty_assertions::assert_eq;

use cncbridge_config::{ConfigError, load_bridge_config, load_config};
use cncbridge_core::{CoreError, DeclaredType};
use cncbridge_driver::Status;

// ── Helpers ─────────────────────────────────────────────────────────

fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

const BASIC_TOML: &str = r#"
[timing]
max_reconnect = 3
recovery_interval_ms = 250

[status]
benign_release = [-8]
fatal = [-8, -16]

[[devices]]
name = "M1"
address = "10.0.0.5"
delay_ms = 500
tags_pack_name = "basic"

[[devices]]
address = "10.0.0.6"
port = 8194
tags_pack_name = "basic"

[tag_packs.basic]
aut = "int16"
"servo_loads.X" = "int64"
errors = "string"
"#;

// ── Loading ─────────────────────────────────────────────────────────

#[test]
fn test_toml_file_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "config.toml", BASIC_TOML);

    let (config, bridge) = load_bridge_config(&path).unwrap();

    assert_eq!(config.devices.len(), 2);
    assert!(config.output.stdout);

    let names: Vec<&str> = bridge.devices.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["M1", "Device 1"]);
    assert_eq!(bridge.devices[0].port, 8193);
    assert_eq!(bridge.devices[0].delay_ms, 500);
    assert_eq!(bridge.devices[1].port, 8194);
    assert_eq!(bridge.devices[1].delay_ms, 1000);

    assert_eq!(bridge.timing.max_reconnect, 3);
    assert_eq!(bridge.timing.max_connect, 5);
    assert_eq!(bridge.timing.recovery_interval, Duration::from_millis(250));
    assert_eq!(bridge.policy.fatal(), &[Status::HANDLE, Status::SOCKET]);
    assert_eq!(bridge.ledger_path, dir.path().join("non_free_handles.json"));

    let pack = &bridge.tag_packs["basic"];
    assert_eq!(pack["aut"], DeclaredType::Int16);
    assert_eq!(pack["servo_loads.X"], DeclaredType::Int64);
}

#[test]
fn test_yaml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "config.yaml",
        r#"
ledger_path: leaks.json
devices:
  - name: Lathe
    address: "::1"
    tags_pack_name: positions
tag_packs:
  positions:
    absolute_positions.X: float64
    cycle_time: float64
"#,
    );

    let (_, bridge) = load_bridge_config(&path).unwrap();

    assert_eq!(bridge.devices[0].name, "Lathe");
    assert_eq!(bridge.devices[0].endpoint(), "[::1]:8193");
    assert_eq!(bridge.ledger_path, dir.path().join("leaks.json"));
    assert_eq!(
        bridge.tag_packs["positions"]["absolute_positions.X"],
        DeclaredType::Float64
    );
}

#[test]
fn test_effective_config_renders_as_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "config.toml", BASIC_TOML);

    let rendered = load_config(&path).unwrap().to_toml().unwrap();

    assert!(rendered.contains("max_reconnect = 3"));
    assert!(rendered.contains("[tag_packs.basic]"));
}

// ── Rejections ──────────────────────────────────────────────────────

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err:?}");
}

#[test]
fn test_malformed_declared_type() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "config.toml",
        r#"
[[devices]]
address = "10.0.0.5"
tags_pack_name = "basic"

[tag_packs.basic]
aut = "int17"
"#,
    );

    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Figment(_)), "got: {err:?}");
}

#[test]
fn test_empty_device_list() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "config.toml", "[tag_packs.basic]\naut = \"int16\"\n");

    let err = load_bridge_config(&path).unwrap_err();
    assert!(
        matches!(err, ConfigError::Invalid(CoreError::NoDevices)),
        "got: {err:?}"
    );
}

#[test]
fn test_duplicate_address() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "config.toml",
        r#"
[[devices]]
name = "A"
address = "10.0.0.5"
tags_pack_name = "basic"

[[devices]]
name = "B"
address = "10.0.0.5"
port = 8194
tags_pack_name = "basic"

[tag_packs.basic]
aut = "int16"
"#,
    );

    let err = load_bridge_config(&path).unwrap_err();
    assert!(
        matches!(err, ConfigError::Invalid(CoreError::DuplicateAddress { .. })),
        "got: {err:?}"
    );
}

#[test]
fn test_unknown_pack_reference() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "config.toml",
        r#"
[[devices]]
address = "10.0.0.5"
tags_pack_name = "missing"
"#,
    );

    let err = load_bridge_config(&path).unwrap_err();
    assert!(
        matches!(err, ConfigError::Invalid(CoreError::UnknownTagPack { .. })),
        "got: {err:?}"
    );
}

#[test]
fn test_zero_retry_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "config.toml",
        r#"
[timing]
max_get_handle = 0

[[devices]]
address = "10.0.0.5"
tags_pack_name = "basic"

[tag_packs.basic]
aut = "int16"
"#,
    );

    let err = load_bridge_config(&path).unwrap_err();
    assert!(err.to_string().contains("max_get_handle"), "got: {err}");
}

#[test]
fn test_blank_address() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "config.toml",
        r#"
[[devices]]
address = " "
tags_pack_name = "basic"

[tag_packs.basic]
aut = "int16"
"#,
    );

    let err = load_bridge_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Validation { .. }), "got: {err:?}");
}
