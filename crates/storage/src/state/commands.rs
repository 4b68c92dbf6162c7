// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command event handlers.

use super::MaterializedState;
use sg_core::Event;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::CommandCreated { command } => {
            // Idempotency: first write wins
            state
                .commands
                .entry(command.command_id.as_str().to_string())
                .or_insert_with(|| command.clone());
        }

        Event::CommandUpdated { command_id, status, attempts, error, updated_at_ms } => {
            if let Some(cmd) = state.commands.get_mut(command_id.as_str()) {
                cmd.status = *status;
                cmd.attempts = *attempts;
                cmd.error = error.clone();
                cmd.updated_at_ms = *updated_at_ms;
            }
        }

        Event::CommandEventAppended { event } => {
            state.command_events.entry(event.id).or_insert_with(|| event.clone());
            state.last_command_event_id = state.last_command_event_id.max(event.id);
        }

        _ => {}
    }
}
