// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay

mod alarms;
mod commands;

use serde::{Deserialize, Serialize};
use sg_core::{
    AlarmEventRecord, AlarmOccurrence, AlarmSource, Command, CommandEvent, Event,
};
use std::collections::{BTreeMap, HashMap};

/// Materialized state built from WAL replay.
///
/// # Idempotency requirement
///
/// **All event handlers MUST be idempotent.** Applying the same event
/// twice must produce the same state as applying it once, because a
/// checkpoint boundary can land between apply and truncate and replay a
/// suffix again. Guidelines:
///
/// - Use assignment (`=`) instead of mutation (`+=`)
/// - Guard inserts with existence checks
/// - Counters advance with `max(last, id)`, never `+= 1`
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    /// Command rows by external command id.
    pub commands: HashMap<String, Command>,
    /// Command lifecycle events, totally ordered by id.
    pub command_events: BTreeMap<u64, CommandEvent>,
    #[serde(default)]
    pub last_command_event_id: u64,

    /// Alarm occurrences by row id.
    pub occurrences: HashMap<u64, AlarmOccurrence>,
    #[serde(default)]
    pub last_occurrence_id: u64,

    /// Alarm transition events, totally ordered by id.
    pub alarm_events: BTreeMap<u64, AlarmEventRecord>,
    #[serde(default)]
    pub last_alarm_event_id: u64,
}

impl MaterializedState {
    /// Apply an event to derive state changes.
    ///
    /// Events are facts about what happened; state is derived from them.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::CommandCreated { .. }
            | Event::CommandUpdated { .. }
            | Event::CommandEventAppended { .. } => commands::apply(self, event),

            Event::AlarmOccurrenceUpserted { .. } | Event::AlarmEventAppended { .. } => {
                alarms::apply(self, event)
            }
        }
    }

    /// Allocate the next command-event id (advanced by apply).
    pub fn peek_command_event_id(&self) -> u64 {
        self.last_command_event_id + 1
    }

    /// Allocate the next occurrence id (advanced by apply).
    pub fn peek_occurrence_id(&self) -> u64 {
        self.last_occurrence_id + 1
    }

    /// Allocate the next alarm-event id (advanced by apply).
    pub fn peek_alarm_event_id(&self) -> u64 {
        self.last_alarm_event_id + 1
    }

    /// Find the occurrence row for a `(source, key)` pair.
    pub fn occurrence_by_key(&self, source: AlarmSource, key: &str) -> Option<&AlarmOccurrence> {
        self.occurrences.values().find(|o| o.source == source && o.key == key)
    }

    /// Command lifecycle events for one command, in order.
    pub fn events_for_command(&self, command_id: &str) -> Vec<&CommandEvent> {
        self.command_events
            .values()
            .filter(|e| e.command_id.as_str() == command_id)
            .collect()
    }

    /// Occurrences with `is_active = true`, most recently seen first.
    pub fn active_occurrences(&self) -> Vec<&AlarmOccurrence> {
        let mut active: Vec<&AlarmOccurrence> =
            self.occurrences.values().filter(|o| o.is_active).collect();
        active.sort_by(|a, b| b.last_seen_ms.cmp(&a.last_seen_ms).then(b.id.cmp(&a.id)));
        active
    }
}

#[cfg(test)]
#[path = "../state_tests.rs"]
mod tests;
