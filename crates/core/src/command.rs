// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command rows and their lifecycle event records.
//!
//! A command is owned by the executor from enqueue to terminal status:
//! `queued → executing → {success | failed | cancelled}`. Terminal states
//! are absorbing, and every transition appends an event record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

crate::define_id! {
    /// External unique id of a command, returned to the caller at create
    /// time and used for all later lookups.
    pub struct CommandId("cmd-");
}

/// Dispatch shape of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Bit,
    Register,
}

crate::simple_display! {
    CommandKind {
        Bit => "bit",
        Register => "register",
    }
}

/// Lifecycle status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Queued,
    Executing,
    Success,
    Failed,
    Cancelled,
}

crate::simple_display! {
    CommandStatus {
        Queued => "queued",
        Executing => "executing",
        Success => "success",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Success | CommandStatus::Failed | CommandStatus::Cancelled)
    }
}

/// Resolved write parameters, captured at validation time so the executor
/// never needs the configuration tree to dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    /// Target register in 4xxxx form.
    pub address: u32,
    pub value: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datapoint_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<bool>,
}

/// A persisted write command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub command_id: CommandId,
    pub plc_name: String,
    /// Canonical datapoint reference (`db-dp:<id>`).
    pub datapoint_ref: String,
    pub kind: CommandKind,
    pub payload: CommandPayload,
    pub status: CommandStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
}

/// Append-only record of one status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEvent {
    /// Monotonic id, totally ordered across all commands.
    pub id: u64,
    pub command_id: CommandId,
    pub ts_ms: u64,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

crate::builder! {
    pub struct CommandBuilder => Command {
        into {
            command_id: CommandId = CommandId::from_string("cmd-test"),
            plc_name: String = "P1",
            datapoint_ref: String = "db-dp:1",
        }
        set {
            kind: CommandKind = CommandKind::Bit,
            payload: CommandPayload = CommandPayload {
                address: 40050,
                value: 1,
                bit: Some(0),
                bit_label: None,
                datapoint_label: None,
                equipment_label: None,
                verify: None,
            },
            status: CommandStatus = CommandStatus::Queued,
            attempts: u32 = 0,
            created_at_ms: u64 = 1_000_000,
            updated_at_ms: u64 = 1_000_000,
        }
        option {
            error: String = None,
            user_id: u32 = None,
            username: String = None,
            client_ip: String = None,
        }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
