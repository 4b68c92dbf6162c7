// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alarm event handlers.

use super::MaterializedState;
use sg_core::Event;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::AlarmOccurrenceUpserted { occurrence } => {
            // Wholesale row replacement is idempotent by construction
            state.occurrences.insert(occurrence.id, occurrence.clone());
            state.last_occurrence_id = state.last_occurrence_id.max(occurrence.id);
        }

        Event::AlarmEventAppended { event } => {
            state.alarm_events.entry(event.id).or_insert_with(|| event.clone());
            state.last_alarm_event_id = state.last_alarm_event_id.max(event.id);
        }

        _ => {}
    }
}
