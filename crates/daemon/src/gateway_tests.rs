// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sg_core::test_support::{
    fixture_containers, fixture_datapoints, fixture_equipment, fixture_plcs,
};
use sg_core::{AccessLevel, FakeClock, Grant, ResourceType, UserId};
use sg_engine::CreateCommandRequest;
use sg_modbus::FakeTransport;
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> GatewayConfig {
    GatewayConfig {
        state_dir: dir.path().join("state"),
        plcs: fixture_plcs(),
        containers: fixture_containers(),
        equipment: fixture_equipment(),
        datapoints: fixture_datapoints(),
        grants: vec![Grant {
            role_id: None,
            user_id: Some(UserId(1)),
            resource_type: ResourceType::Datapoint,
            resource_id: 17,
            access_level: AccessLevel::Write,
            include_descendants: false,
        }],
        ..GatewayConfig::default()
    }
}

fn operator() -> Principal {
    Principal::user(1, "operator", vec![])
}

#[tokio::test]
async fn operations_before_start_report_not_started() {
    let dir = TempDir::new().unwrap();
    let gateway =
        Gateway::new(test_config(&dir), FakeTransport::new(), FakeClock::new()).unwrap();

    assert!(!gateway.is_started());
    assert!(matches!(
        gateway.get_filtered_snapshot(&operator()),
        Err(GatewayError::NotStarted)
    ));
    assert!(matches!(gateway.subscribe_alarms(), Err(GatewayError::NotStarted)));
}

#[tokio::test]
async fn start_is_idempotent_and_shutdown_is_bounded() {
    let dir = TempDir::new().unwrap();
    let mut gateway =
        Gateway::new(test_config(&dir), FakeTransport::new(), FakeClock::new()).unwrap();

    gateway.start().await.unwrap();
    gateway.start().await.unwrap();
    assert!(gateway.is_started());

    gateway.shutdown().await;
    assert!(!gateway.is_started());
    // Shutting down twice is fine
    gateway.shutdown().await;
}

#[tokio::test]
async fn command_round_trip_through_the_gateway() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::new();
    let mut gateway =
        Gateway::new(test_config(&dir), transport.clone(), FakeClock::new()).unwrap();
    gateway.start().await.unwrap();

    let result = gateway
        .create_command(
            &operator(),
            Some("10.0.0.9"),
            CreateCommandRequest {
                plc_name: "P1".to_string(),
                datapoint_ref: "db-dp:17".to_string(),
                kind: None,
                value: 1,
                bit: Some(0),
                verify: None,
            },
        )
        .unwrap();

    // Wait for the executor to finish the write
    let command = tokio::time::timeout(std::time::Duration::from_secs(2), async {
        loop {
            if let Some((command, _)) = gateway.get_command(result.command_id.as_str()).unwrap() {
                if command.status.is_terminal() {
                    return command;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(command.status, sg_core::CommandStatus::Success);
    // 40050 − 40001 = offset 49, bit 0 set on the fixture PLC
    assert_eq!(transport.register("127.0.0.1", 502, 49) & 1, 1);

    let page = gateway.list_commands(&sg_engine::CommandFilter::default()).unwrap();
    assert_eq!(page.total, 1);

    gateway.shutdown().await;
}

#[tokio::test]
async fn restart_preserves_durable_state() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let command_id = {
        let mut gateway =
            Gateway::new(config.clone(), FakeTransport::new(), FakeClock::new()).unwrap();
        gateway.start().await.unwrap();
        let result = gateway
            .create_command(
                &operator(),
                None,
                CreateCommandRequest {
                    plc_name: "P1".to_string(),
                    datapoint_ref: "db-dp:17".to_string(),
                    kind: None,
                    value: 1,
                    bit: Some(0),
                    verify: None,
                },
            )
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        gateway.shutdown().await;
        result.command_id
    };

    let mut gateway = Gateway::new(config, FakeTransport::new(), FakeClock::new()).unwrap();
    gateway.start().await.unwrap();
    let (command, events) = gateway.get_command(command_id.as_str()).unwrap().unwrap();
    assert_eq!(command.command_id, command_id);
    assert!(!events.is_empty());
    gateway.shutdown().await;
}

#[tokio::test]
async fn snapshot_filtering_runs_through_access_control() {
    let dir = TempDir::new().unwrap();
    let mut gateway =
        Gateway::new(test_config(&dir), FakeTransport::new(), FakeClock::new()).unwrap();
    gateway.start().await.unwrap();

    // The operator's grant on dp 17 escalates read access up its chain
    let trees = gateway.get_filtered_snapshot(&operator()).unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].plc, "P1");

    let stranger = Principal::user(5, "stranger", vec![]);
    assert!(gateway.get_filtered_snapshot(&stranger).unwrap().is_empty());

    gateway.shutdown().await;
}

#[tokio::test]
async fn alarm_subscription_starts_with_a_snapshot() {
    let dir = TempDir::new().unwrap();
    let mut gateway =
        Gateway::new(test_config(&dir), FakeTransport::new(), FakeClock::new()).unwrap();
    gateway.start().await.unwrap();

    let mut sub = gateway.subscribe_alarms().unwrap();
    let first = sub.rx.try_recv().unwrap();
    assert_eq!(first["type"], "snapshot");
    assert_eq!(first["channel"], "alarms");
    assert!(first["active"].as_array().unwrap().is_empty());

    gateway.unsubscribe(&sub.id).unwrap();
    gateway.shutdown().await;
}

#[tokio::test]
async fn command_subscription_seeds_recent_events() {
    let dir = TempDir::new().unwrap();
    let mut gateway =
        Gateway::new(test_config(&dir), FakeTransport::new(), FakeClock::new()).unwrap();
    gateway.start().await.unwrap();

    gateway
        .create_command(
            &operator(),
            None,
            CreateCommandRequest {
                plc_name: "P1".to_string(),
                datapoint_ref: "db-dp:17".to_string(),
                kind: None,
                value: 1,
                bit: Some(0),
                verify: None,
            },
        )
        .unwrap();

    let mut sub = gateway.subscribe_commands().unwrap();
    let first = sub.rx.try_recv().unwrap();
    assert_eq!(first["type"], "snapshot");
    assert_eq!(first["channel"], "commands");
    assert!(!first["items"].as_array().unwrap().is_empty());

    gateway.shutdown().await;
}

#[tokio::test]
async fn health_snapshot_covers_every_plc() {
    let dir = TempDir::new().unwrap();
    let mut gateway =
        Gateway::new(test_config(&dir), FakeTransport::new(), FakeClock::new()).unwrap();
    gateway.start().await.unwrap();

    let health = gateway.health_snapshot().unwrap();
    assert_eq!(health.len(), 2);
    assert!(health.contains_key("P1"));
    assert!(health.contains_key("P2"));

    gateway.shutdown().await;
}
