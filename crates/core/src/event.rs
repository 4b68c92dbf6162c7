// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events persisted to the write-ahead log.
//!
//! Events are facts about what happened; the materialized state is derived
//! from them. Every variant is a plain record-write whose application is
//! idempotent, so replaying a prefix twice cannot corrupt state.

use crate::alarm::{AlarmEventRecord, AlarmOccurrence};
use crate::command::{Command, CommandEvent, CommandId, CommandStatus};
use serde::{Deserialize, Serialize};

/// Events that mutate durable runtime state.
///
/// Serializes with `{"type": "family:name", ...fields}` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A command row was inserted with status `queued`.
    #[serde(rename = "command:created")]
    CommandCreated { command: Command },

    /// A command row changed status / attempts / error.
    #[serde(rename = "command:updated")]
    CommandUpdated {
        command_id: CommandId,
        status: CommandStatus,
        attempts: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        updated_at_ms: u64,
    },

    /// A command lifecycle event was appended.
    #[serde(rename = "command:event")]
    CommandEventAppended { event: CommandEvent },

    /// An alarm occurrence row was inserted or replaced.
    #[serde(rename = "alarm:occurrence")]
    AlarmOccurrenceUpserted { occurrence: AlarmOccurrence },

    /// An alarm transition event was appended.
    #[serde(rename = "alarm:event")]
    AlarmEventAppended { event: AlarmEventRecord },
}

impl Event {
    /// Short operation name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Event::CommandCreated { .. } => "command:created",
            Event::CommandUpdated { .. } => "command:updated",
            Event::CommandEventAppended { .. } => "command:event",
            Event::AlarmOccurrenceUpserted { .. } => "alarm:occurrence",
            Event::AlarmEventAppended { .. } => "alarm:event",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
