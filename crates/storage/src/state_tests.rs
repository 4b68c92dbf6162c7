// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::Map;
use sg_core::{AlarmSource, AlarmState, CommandStatus};

fn command_event(id: u64, command_id: &str, status: CommandStatus) -> CommandEvent {
    CommandEvent {
        id,
        command_id: command_id.into(),
        ts_ms: 1000 + id,
        status,
        message: None,
        meta: Map::new(),
    }
}

fn occurrence(id: u64, key: &str, state: AlarmState) -> AlarmOccurrence {
    AlarmOccurrence {
        id,
        source: AlarmSource::BackendRule,
        key: key.to_string(),
        datapoint_id: None,
        rule_id: None,
        external_rule_id: None,
        state,
        severity: "info".to_string(),
        message: String::new(),
        value: None,
        warning_threshold: None,
        alarm_threshold: None,
        first_seen_ms: 1,
        last_seen_ms: 1,
        cleared_at_ms: None,
        is_active: state.is_active(),
        acknowledged: false,
        acknowledged_at_ms: None,
        acknowledged_by_user_id: None,
        acknowledged_by_client_ip: None,
        meta: Map::new(),
    }
}

#[test]
fn command_created_inserts_once() {
    let mut state = MaterializedState::default();
    let command = Command::builder().build();
    let event = Event::CommandCreated { command: command.clone() };

    state.apply_event(&event);
    state.apply_event(&event);

    assert_eq!(state.commands.len(), 1);
    assert_eq!(state.commands[command.command_id.as_str()], command);
}

#[test]
fn command_updated_assigns_fields() {
    let mut state = MaterializedState::default();
    let command = Command::builder().build();
    let id = command.command_id.clone();
    state.apply_event(&Event::CommandCreated { command });

    let update = Event::CommandUpdated {
        command_id: id.clone(),
        status: CommandStatus::Failed,
        attempts: 3,
        error: Some("write failed".to_string()),
        updated_at_ms: 2000,
    };
    state.apply_event(&update);
    state.apply_event(&update);

    let cmd = &state.commands[id.as_str()];
    assert_eq!(cmd.status, CommandStatus::Failed);
    assert_eq!(cmd.attempts, 3);
    assert_eq!(cmd.error.as_deref(), Some("write failed"));
    assert_eq!(cmd.updated_at_ms, 2000);
}

#[test]
fn command_update_for_unknown_command_is_ignored() {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::CommandUpdated {
        command_id: "cmd-missing".into(),
        status: CommandStatus::Success,
        attempts: 1,
        error: None,
        updated_at_ms: 1,
    });
    assert!(state.commands.is_empty());
}

#[test]
fn command_events_are_idempotent_and_advance_the_counter() {
    let mut state = MaterializedState::default();
    assert_eq!(state.peek_command_event_id(), 1);

    let event =
        Event::CommandEventAppended { event: command_event(1, "cmd-1", CommandStatus::Queued) };
    state.apply_event(&event);
    state.apply_event(&event);

    assert_eq!(state.command_events.len(), 1);
    assert_eq!(state.peek_command_event_id(), 2);
}

#[test]
fn events_for_command_filters_and_orders() {
    let mut state = MaterializedState::default();
    for (id, cmd, status) in [
        (1, "cmd-a", CommandStatus::Queued),
        (2, "cmd-b", CommandStatus::Queued),
        (3, "cmd-a", CommandStatus::Executing),
        (4, "cmd-a", CommandStatus::Success),
    ] {
        state.apply_event(&Event::CommandEventAppended { event: command_event(id, cmd, status) });
    }

    let timeline: Vec<CommandStatus> =
        state.events_for_command("cmd-a").iter().map(|e| e.status).collect();
    assert_eq!(
        timeline,
        vec![CommandStatus::Queued, CommandStatus::Executing, CommandStatus::Success]
    );
}

#[test]
fn occurrence_upsert_replaces_wholesale() {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::AlarmOccurrenceUpserted {
        occurrence: occurrence(1, "backend_rule:1", AlarmState::Warning),
    });
    state.apply_event(&Event::AlarmOccurrenceUpserted {
        occurrence: occurrence(1, "backend_rule:1", AlarmState::Alarm),
    });

    assert_eq!(state.occurrences.len(), 1);
    assert_eq!(state.occurrences[&1].state, AlarmState::Alarm);
    assert_eq!(state.peek_occurrence_id(), 2);
}

#[test]
fn occurrence_by_key_matches_source_and_key() {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::AlarmOccurrenceUpserted {
        occurrence: occurrence(1, "backend_rule:7", AlarmState::Ok),
    });

    assert!(state.occurrence_by_key(AlarmSource::BackendRule, "backend_rule:7").is_some());
    assert!(state.occurrence_by_key(AlarmSource::FrontendRule, "backend_rule:7").is_none());
    assert!(state.occurrence_by_key(AlarmSource::BackendRule, "backend_rule:8").is_none());
}

#[test]
fn active_occurrences_sort_most_recent_first() {
    let mut state = MaterializedState::default();
    let mut old = occurrence(1, "a", AlarmState::Alarm);
    old.last_seen_ms = 100;
    let mut new = occurrence(2, "b", AlarmState::Warning);
    new.last_seen_ms = 200;
    let cleared = occurrence(3, "c", AlarmState::Ok);

    for occ in [old, new, cleared] {
        state.apply_event(&Event::AlarmOccurrenceUpserted { occurrence: occ });
    }

    let active: Vec<u64> = state.active_occurrences().iter().map(|o| o.id).collect();
    assert_eq!(active, vec![2, 1]);
}

#[test]
fn checkpoint_serde_round_trips() {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::CommandCreated { command: Command::builder().build() });
    state.apply_event(&Event::AlarmOccurrenceUpserted {
        occurrence: occurrence(1, "k", AlarmState::Alarm),
    });
    state.apply_event(&Event::CommandEventAppended {
        event: command_event(1, "cmd-test", CommandStatus::Queued),
    });

    let json = serde_json::to_string(&state).unwrap();
    let parsed: MaterializedState = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.commands.len(), 1);
    assert_eq!(parsed.occurrences.len(), 1);
    assert_eq!(parsed.command_events.len(), 1);
    assert_eq!(parsed.last_command_event_id, 1);
}
