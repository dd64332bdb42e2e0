#![allow(clippy::unwrap_used)]
// Config file loading and saving against temporary directories.

use std::path::Path;
use std::time::Duration;

use pretty_assertions::assert_eq;

use headlink_config::{Config, ConfigError, load_config_from, save_config_to, to_agent_config};

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from(&dir.path().join("config.toml")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_partial_file_merges_over_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r##"
[device]
simulation = true
discharge_rate_per_min = 0.25

[operator]
name = "Desk 7"
color = "#ff5722"

[files]
keymap = "maps/desk7.json"
"##,
    )
    .unwrap();

    let config = load_config_from(&path).unwrap();
    assert!(config.device.simulation);
    assert_eq!(config.device.vendor_id, 0x0b0e);
    assert_eq!(config.operator.name, "Desk 7");
    assert_eq!(config.realtime.port, 11967);

    let agent = to_agent_config(&config, dir.path()).unwrap();
    assert!(agent.monitor.simulation);
    assert!((agent.monitor.discharge_rate - 0.25).abs() < f64::EPSILON);
    assert_eq!(agent.monitor.default_color, "#ff5722");
    assert_eq!(agent.keymap_path, dir.path().join("maps/desk7.json"));
    assert_eq!(agent.whitelist_path, dir.path().join("allowed_devices.json"));
    assert_eq!(agent.device.poll_interval, Duration::from_secs(2));
}

#[test]
fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.realtime.enabled = true;
    config.realtime.host = "acc.local".into();
    config.realtime.extension = "2001".into();
    config.http.timeout_secs = 3;
    save_config_to(&config, &path).unwrap();

    assert_eq!(load_config_from(&path).unwrap(), config);
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[realtime]\nenabled = true\n").unwrap();

    let err = load_config_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "realtime.host"));
}

#[test]
fn test_malformed_toml_is_figment_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[device\nsimulation = yes").unwrap();

    assert!(matches!(
        load_config_from(Path::new(&path)),
        Err(ConfigError::Figment(_))
    ));
}
