// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::audit::RecordingAudit;
use crate::commands::executor::CommandExecutor;
use crate::hub::BroadcastHub;
use crate::limiter::WindowLimiter;
use sg_core::test_support::fixture_tree_with;
use sg_core::{AccessLevel, FakeClock, Grant, UserId};
use sg_modbus::{DeviceService, FakeTransport, ModbusSettings, PlcEndpoint};
use sg_storage::Store;
use tempfile::TempDir;
use yare::parameterized;

struct Fixture {
    _dir: TempDir,
    service: CommandService<FakeTransport, FakeClock>,
    store: Arc<Store>,
    audit: RecordingAudit,
    clock: FakeClock,
}

fn write_grant(user: u32, dp: u32) -> Grant {
    Grant {
        role_id: None,
        user_id: Some(UserId(user)),
        resource_type: ResourceType::Datapoint,
        resource_id: dp,
        access_level: AccessLevel::Write,
        include_descendants: false,
    }
}

fn fixture_with_limit(rate_limit_per_minute: u32) -> Fixture {
    let dir = TempDir::new().unwrap();
    // User 1 may write the writable fixture datapoints
    let config = Arc::new(fixture_tree_with(
        vec![write_grant(1, 17), write_grant(1, 3), write_grant(1, 31)],
        vec![],
    ));
    let transport = FakeTransport::new();
    let clock = FakeClock::new();
    let devices = Arc::new(DeviceService::new(
        transport.clone(),
        clock.clone(),
        ModbusSettings::default(),
        config.plcs().iter().map(PlcEndpoint::from).collect::<Vec<_>>(),
    ));
    let store = Arc::new(Store::open(dir.path()).unwrap());
    let hub = Arc::new(BroadcastHub::new());
    let settings = CommandSettings { rate_limit_per_minute, ..CommandSettings::default() };
    let executor = Arc::new(CommandExecutor::new(
        devices,
        Arc::clone(&store),
        Arc::clone(&hub),
        Arc::clone(&config),
        clock.clone(),
        settings.clone(),
    ));
    let audit = RecordingAudit::new();
    let service = CommandService::new(
        Arc::clone(&store),
        executor,
        Arc::new(WindowLimiter::new(clock.clone())),
        Arc::new(audit.clone()),
        hub,
        config,
        clock.clone(),
        settings,
        15,
    );
    Fixture { _dir: dir, service, store, audit, clock }
}

fn fixture() -> Fixture {
    fixture_with_limit(30)
}

fn operator() -> Principal {
    Principal::user(1, "operator", vec![])
}

fn bit_request() -> CreateCommandRequest {
    CreateCommandRequest {
        plc_name: "P1".to_string(),
        datapoint_ref: "db-dp:17".to_string(),
        kind: None,
        value: 1,
        bit: Some(0),
        verify: None,
    }
}

fn register_request(value: i64) -> CreateCommandRequest {
    CreateCommandRequest {
        plc_name: "P1".to_string(),
        datapoint_ref: "db-dp:3".to_string(),
        kind: Some(CommandKind::Register),
        value,
        bit: None,
        verify: None,
    }
}

#[tokio::test]
async fn valid_bit_write_is_queued_and_persisted() {
    let fx = fixture();
    let result = fx.service.create(&operator(), Some("10.0.0.9"), bit_request()).unwrap();
    assert_eq!(result.status, CommandStatus::Queued);

    let state = fx.store.read();
    let command = &state.commands[result.command_id.as_str()];
    assert_eq!(command.kind, CommandKind::Bit);
    assert_eq!(command.datapoint_ref, "db-dp:17");
    assert_eq!(command.payload.address, 40050);
    assert_eq!(command.payload.bit, Some(0));
    assert_eq!(command.payload.bit_label.as_deref(), Some("Run"));
    assert_eq!(command.payload.datapoint_label.as_deref(), Some("START"));
    assert_eq!(command.payload.equipment_label.as_deref(), Some("Compressor 1"));
    assert_eq!(command.username.as_deref(), Some("operator"));
    assert_eq!(command.client_ip.as_deref(), Some("10.0.0.9"));

    // The first event carries the rate-limit meta
    let events = state.events_for_command(result.command_id.as_str());
    assert_eq!(events[0].status, CommandStatus::Queued);
    assert_eq!(events[0].meta["rate_remaining"], 29);
}

#[tokio::test]
async fn create_writes_an_audit_record() {
    let fx = fixture();
    let result = fx.service.create(&operator(), Some("10.0.0.9"), bit_request()).unwrap();

    let calls = fx.audit.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].action, "command.create");
    assert_eq!(calls[0].user_id, Some(1));
    assert_eq!(calls[0].resource, "P1");
    assert_eq!(calls[0].meta["command_id"], result.command_id.as_str());
}

#[tokio::test]
async fn integer_boundaries_accept_0_and_65535() {
    let fx = fixture();
    for value in [0i64, 65535] {
        let result = fx.service.create(&operator(), None, register_request(value)).unwrap();
        assert_eq!(result.status, CommandStatus::Queued);
    }
}

#[parameterized(
    negative = { -1 },
    too_large = { 65536 },
)]
fn integer_out_of_range_is_rejected(value: i64) {
    let fx = fixture();
    let err = fx.service.create(&operator(), None, register_request(value)).unwrap_err();
    assert!(matches!(err, CommandError::ValueOutOfRange));
}

#[tokio::test]
async fn integer_writes_verify_unless_disabled() {
    let fx = fixture();
    let result = fx.service.create(&operator(), None, register_request(7)).unwrap();
    assert_eq!(
        fx.store.read().commands[result.command_id.as_str()].payload.verify,
        Some(true)
    );

    let mut request = register_request(7);
    request.verify = Some(false);
    let result = fx.service.create(&operator(), None, request).unwrap();
    assert_eq!(
        fx.store.read().commands[result.command_id.as_str()].payload.verify,
        Some(false)
    );
}

#[test]
fn unknown_plc_is_rejected() {
    let fx = fixture();
    let mut request = bit_request();
    request.plc_name = "P9".to_string();
    let err = fx.service.create(&operator(), None, request).unwrap_err();
    assert!(matches!(err, CommandError::UnknownPlc(plc) if plc == "P9"));
}

#[test]
fn datapoint_of_another_plc_is_rejected() {
    let fx = fixture();
    let mut request = bit_request();
    // db-dp:31 lives under P2
    request.datapoint_ref = "db-dp:31".to_string();
    let err = fx.service.create(&operator(), None, request).unwrap_err();
    assert!(matches!(err, CommandError::WrongPlc { .. }));
}

#[test]
fn read_only_datapoints_are_rejected() {
    let fx = fixture();
    let mut request = bit_request();
    request.datapoint_ref = "db-dp:7".to_string();
    let err = fx.service.create(&operator(), None, request).unwrap_err();
    assert!(matches!(err, CommandError::NotWritable(_)));
}

#[parameterized(
    bit_missing = { None, 1, false },
    bit_too_large = { Some(16), 1, false },
    value_two = { Some(0), 2, false },
    bit_not_labeled = { Some(1), 1, true },
)]
fn digital_validation_rejects(bit: Option<u8>, value: i64, expect_not_allowed: bool) {
    let fx = fixture();
    let mut request = bit_request();
    request.bit = bit;
    request.value = value;
    let err = fx.service.create(&operator(), None, request).unwrap_err();
    if expect_not_allowed {
        assert!(matches!(err, CommandError::BitNotAllowed { bit: 1, .. }));
    } else {
        assert!(matches!(
            err,
            CommandError::BitRequired
                | CommandError::BitOutOfRange(_)
                | CommandError::BitValueOutOfRange
        ));
    }
}

#[tokio::test]
async fn digital_bits_0_and_15_pass_range_validation() {
    let fx = fixture();
    // Bit 15 is in range but unlabeled on the fixture point: range check
    // passes, the allowed-bit check is what rejects it.
    let mut request = bit_request();
    request.bit = Some(15);
    let err = fx.service.create(&operator(), None, request).unwrap_err();
    assert!(matches!(err, CommandError::BitNotAllowed { bit: 15, .. }));

    let result = fx.service.create(&operator(), None, bit_request()).unwrap();
    assert_eq!(result.status, CommandStatus::Queued);
}

#[test]
fn kind_mismatch_is_rejected() {
    let fx = fixture();
    let mut request = bit_request();
    request.kind = Some(CommandKind::Register);
    let err = fx.service.create(&operator(), None, request).unwrap_err();
    assert!(matches!(
        err,
        CommandError::KindMismatch { point_type: PointType::Digital, .. }
    ));

    let mut request = register_request(1);
    request.kind = Some(CommandKind::Bit);
    let err = fx.service.create(&operator(), None, request).unwrap_err();
    assert!(matches!(
        err,
        CommandError::KindMismatch { point_type: PointType::Integer, .. }
    ));
}

#[test]
fn principal_without_write_grant_is_forbidden() {
    let fx = fixture();
    let stranger = Principal::user(2, "stranger", vec![]);
    let err = fx.service.create(&stranger, None, bit_request()).unwrap_err();
    match err {
        CommandError::Forbidden { action, resource } => {
            assert_eq!(action, "write");
            assert_eq!(resource, "datapoint");
        }
        other => panic!("expected Forbidden, got {other}"),
    }
}

#[tokio::test]
async fn admin_bypasses_object_grants() {
    let fx = fixture();
    let admin = Principal::user(9, "root", vec![]).with_permissions(["users:admin"]);
    let result = fx.service.create(&admin, None, bit_request()).unwrap();
    assert_eq!(result.status, CommandStatus::Queued);
}

#[tokio::test]
async fn rate_limit_applies_per_user_plc_datapoint() {
    let fx = fixture_with_limit(2);

    fx.service.create(&operator(), None, bit_request()).unwrap();
    fx.service.create(&operator(), None, bit_request()).unwrap();
    let err = fx.service.create(&operator(), None, bit_request()).unwrap_err();
    match err {
        CommandError::RateLimited { reset_after_s } => assert!(reset_after_s > 0.0),
        other => panic!("expected RateLimited, got {other}"),
    }

    // A different datapoint has its own window
    fx.service.create(&operator(), None, register_request(1)).unwrap();
}

#[test]
fn cancel_transitions_queued_commands_only() {
    let fx = fixture();
    // Insert a queued row directly so no worker races the cancel
    let id = fx
        .store
        .transact(|state| {
            let command = Command::builder().command_id(CommandId::new()).build();
            let id = command.command_id.clone();
            let event = CommandEvent {
                id: state.peek_command_event_id(),
                command_id: id.clone(),
                ts_ms: 1,
                status: CommandStatus::Queued,
                message: None,
                meta: Map::new(),
            };
            (
                vec![
                    Event::CommandCreated { command },
                    Event::CommandEventAppended { event },
                ],
                id,
            )
        })
        .unwrap();

    let status = fx.service.cancel(id.as_str(), &operator()).unwrap();
    assert_eq!(status, CommandStatus::Cancelled);

    let state = fx.store.read();
    let command = &state.commands[id.as_str()];
    assert_eq!(command.status, CommandStatus::Cancelled);
    assert_eq!(command.error.as_deref(), Some("cancelled"));
    let events = state.events_for_command(id.as_str());
    assert_eq!(events.last().unwrap().status, CommandStatus::Cancelled);
    assert_eq!(events.last().unwrap().meta["by"], "operator");
    drop(state);

    // Cancelling again is a no-op that reports the current status
    let status = fx.service.cancel(id.as_str(), &operator()).unwrap();
    assert_eq!(status, CommandStatus::Cancelled);
    assert_eq!(fx.store.read().events_for_command(id.as_str()).len(), 2);
}

#[test]
fn cancel_unknown_command_is_not_found() {
    let fx = fixture();
    let err = fx.service.cancel("cmd-missing", &operator()).unwrap_err();
    assert!(matches!(err, CommandError::NotFound(_)));
}

#[tokio::test]
async fn get_returns_the_row_with_its_timeline() {
    let fx = fixture();
    let result = fx.service.create(&operator(), None, bit_request()).unwrap();

    let (command, events) = fx.service.get(result.command_id.as_str()).unwrap();
    assert_eq!(command.command_id, result.command_id);
    assert!(!events.is_empty());
    assert_eq!(events[0].status, CommandStatus::Queued);

    assert!(fx.service.get("cmd-nope").is_none());
}

#[tokio::test]
async fn list_filters_and_paginates_newest_first() {
    let fx = fixture();
    for i in 0..3 {
        fx.clock.advance(std::time::Duration::from_secs(1));
        if i == 2 {
            let request = CreateCommandRequest {
                plc_name: "P2".to_string(),
                datapoint_ref: "db-dp:31".to_string(),
                kind: Some(CommandKind::Register),
                value: 5,
                bit: None,
                verify: None,
            };
            fx.service.create(&operator(), None, request).unwrap();
        } else {
            fx.service.create(&operator(), None, bit_request()).unwrap();
        }
    }

    let all = fx.service.list(&CommandFilter::default());
    assert_eq!(all.total, 3);
    assert!(all.items[0].created_at_ms >= all.items[1].created_at_ms);

    let p2_only =
        fx.service.list(&CommandFilter { plc_name: Some("P2".to_string()), ..CommandFilter::default() });
    assert_eq!(p2_only.total, 1);
    assert_eq!(p2_only.items[0].plc_name, "P2");

    let paged = fx.service.list(&CommandFilter { limit: 1, offset: 1, ..CommandFilter::default() });
    assert_eq!(paged.total, 3);
    assert_eq!(paged.items.len(), 1);

    let queued_or_later = fx.service.list(&CommandFilter {
        status: Some(CommandStatus::Queued),
        ..CommandFilter::default()
    });
    assert!(queued_or_later.total <= 3);
}

#[tokio::test]
async fn recent_log_payloads_cover_the_latest_events() {
    let fx = fixture();
    fx.service.create(&operator(), None, bit_request()).unwrap();

    let payloads = fx.service.recent_log_payloads(10);
    assert!(!payloads.is_empty());
    assert_eq!(payloads[0]["type"], "command_log");
}
