// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

const FULL_CONFIG: &str = r#"
state_dir = "/var/lib/sg"

[modbus]
timeout_s = 1.5
retries = 1
backoff_s = 0.1
max_backoff_s = 0.5
real_extra_offset = 0

[polling]
enabled = false
interval_s = 2.0
max_block_regs = 50
max_gap_regs = 1

[commands]
max_retries = 4
backoff_s = 0.5
rate_limit_per_minute = 10

[alarms]
digital_bit_max = 15

[[plcs]]
id = 1
name = "P1"
host = "10.0.0.5"

[[containers]]
id = 2
plc_id = 1
name = "Engine Room"
type = "room"

[[equipment]]
id = 4
container_id = 2
name = "Compressor 1"
type = "screw_comp"

[[datapoints]]
id = 17
owner = { kind = "equipment", id = 4 }
label = "START"
type = "DIGITAL"
category = "write"
address = 40050
bits = [{ bit = 0, label = "Run" }]

[[datapoints]]
id = 9
owner = { kind = "equipment", id = 4 }
label = "SUCTION_PRESSURE"
type = "REAL"
category = "read"
address = 40101
multiplier = 0.1

[[grants]]
user_id = 1
resource_type = "datapoint"
resource_id = 17
access_level = "write"
include_descendants = false

[[rules]]
id = 1
datapoint_id = 9
name = "low suction"
severity = "critical"
comparison = "below"
warning_enabled = true
warning_threshold = 2.0
alarm_threshold = 1.0

[rules.schedule]
start_time = "08:00:00"
end_time = "17:00:00"
timezone = "Asia/Kolkata"
"#;

#[test]
fn full_config_parses_and_builds_a_tree() {
    let config: GatewayConfig = toml::from_str(FULL_CONFIG).unwrap();
    assert_eq!(config.state_dir, PathBuf::from("/var/lib/sg"));
    assert_eq!(config.plcs.len(), 1);
    assert_eq!(config.plcs[0].port, 502); // default
    assert_eq!(config.datapoints.len(), 2);
    assert_eq!(config.datapoints[1].multiplier, 0.1);
    assert_eq!(config.rules.len(), 1);
    let schedule = config.rules[0].schedule.as_ref().unwrap();
    assert_eq!(schedule.timezone, "Asia/Kolkata");

    let tree = config.build_tree().unwrap();
    assert_eq!(tree.plcs().len(), 1);
    assert_eq!(tree.grants().len(), 1);
}

#[test]
fn settings_convert_to_durations() {
    let config: GatewayConfig = toml::from_str(FULL_CONFIG).unwrap();

    let modbus = config.modbus_settings();
    assert_eq!(modbus.timeout, Duration::from_millis(1500));
    assert_eq!(modbus.retries, 1);
    assert_eq!(modbus.backoff, Duration::from_millis(100));

    let poller = config.poller_settings();
    assert_eq!(poller.interval, Duration::from_secs(2));
    assert_eq!(poller.max_block_regs, 50);

    // The REAL extra offset travels on the validated tree, not the
    // poller settings
    assert_eq!(config.build_tree().unwrap().real_extra_offset(), 0);

    let commands = config.command_settings();
    assert_eq!(commands.max_retries, 4);
    assert_eq!(commands.backoff, Duration::from_millis(500));
    assert_eq!(commands.rate_limit_per_minute, 10);
}

#[test]
fn empty_config_uses_defaults() {
    let config: GatewayConfig = toml::from_str("").unwrap();
    assert_eq!(config.state_dir, PathBuf::from("state"));
    assert!(config.polling.enabled);
    assert_eq!(config.modbus.real_extra_offset, 1);
    assert_eq!(config.commands.rate_limit_per_minute, 30);
    assert_eq!(config.alarms.digital_bit_max, 15);
    assert!(config.plcs.is_empty());
    assert!(config.build_tree().unwrap().plcs().is_empty());
}

#[test]
fn invalid_tree_is_rejected_at_build() {
    let mut config: GatewayConfig = toml::from_str(FULL_CONFIG).unwrap();
    // Writable REAL violates the data-model invariants
    config.datapoints[1].category = sg_core::PointCategory::Write;
    assert!(matches!(config.build_tree(), Err(ConfigError::WritableReal { .. })));
}

#[test]
fn load_reports_missing_files() {
    let err = GatewayConfig::load(Path::new("/nonexistent/gateway.toml")).unwrap_err();
    assert!(matches!(err, ConfigFileError::Io { .. }));
}

#[test]
fn load_reports_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gateway.toml");
    std::fs::write(&path, "state_dir = [not valid").unwrap();
    let err = GatewayConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigFileError::Parse { .. }));
}
