// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command intake: validation against the configuration tree, object
//! authorization, rate limiting, persistence, and enqueue.
//!
//! The returned `command_id` is the caller's handle; everything after
//! the synchronous `queued` answer happens on the PLC's worker.

use crate::audit::AuditSink;
use crate::commands::executor::{CommandExecutor, CommandSettings};
use crate::hub::{command_log_payload, BroadcastHub, Channel};
use crate::limiter::RateLimit;
use serde_json::{json, Map};
use sg_core::{
    Clock, Command, CommandEvent, CommandId, CommandKind, CommandPayload, CommandStatus,
    ConfigTree, DatapointRefError, EffectiveAccess, Event, PointCategory, PointType, Principal,
    ResourceType,
};
use sg_modbus::ModbusTransport;
use sg_storage::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from command intake and lookup
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown plc '{0}'")]
    UnknownPlc(String),
    #[error(transparent)]
    Datapoint(#[from] DatapointRefError),
    #[error("datapoint '{reference}' does not belong to plc '{plc}'")]
    WrongPlc { reference: String, plc: String },
    #[error("datapoint '{0}' is not configured as writable")]
    NotWritable(String),
    #[error("REAL datapoints cannot be written")]
    RealNotWritable,
    #[error("{point_type} points only support kind '{expected}'")]
    KindMismatch { point_type: PointType, expected: CommandKind },
    #[error("bit is required for DIGITAL writes")]
    BitRequired,
    #[error("bit must be in 0..={0}")]
    BitOutOfRange(u8),
    #[error("bit {bit} is not permitted for this datapoint (allowed: {allowed:?})")]
    BitNotAllowed { bit: u8, allowed: Vec<u8> },
    #[error("value must be 0 or 1 for bit writes")]
    BitValueOutOfRange,
    #[error("value out of 0..=65535")]
    ValueOutOfRange,
    #[error("write address must be a 4xxxx holding register")]
    AddressNotWritable,
    #[error("rate limit exceeded, retry in {reset_after_s:.1}s")]
    RateLimited { reset_after_s: f64 },
    #[error("not authorized to {action} {resource}")]
    Forbidden { action: String, resource: String },
    #[error("command '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A validated-but-raw write intent from the transport layer.
#[derive(Debug, Clone)]
pub struct CreateCommandRequest {
    pub plc_name: String,
    pub datapoint_ref: String,
    /// `bit` or `register`; inferred from the datapoint type if omitted.
    pub kind: Option<CommandKind>,
    pub value: i64,
    pub bit: Option<u8>,
    /// INTEGER writes verify unless explicitly disabled.
    pub verify: Option<bool>,
}

/// What `CreateCommand` answers synchronously.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateResult {
    pub command_id: CommandId,
    pub status: CommandStatus,
}

/// Filters for `ListCommands`.
#[derive(Debug, Clone, Default)]
pub struct CommandFilter {
    pub plc_name: Option<String>,
    pub datapoint_ref: Option<String>,
    pub status: Option<CommandStatus>,
    pub limit: usize,
    pub offset: usize,
}

/// One page of command rows, newest first.
#[derive(Debug, Clone)]
pub struct CommandPage {
    pub total: usize,
    pub items: Vec<Command>,
}

/// Validates, persists, and enqueues write commands.
pub struct CommandService<T: ModbusTransport, C: Clock> {
    store: Arc<Store>,
    executor: Arc<CommandExecutor<T, C>>,
    limiter: Arc<dyn RateLimit>,
    audit: Arc<dyn AuditSink>,
    hub: Arc<BroadcastHub>,
    config: Arc<ConfigTree>,
    clock: C,
    settings: CommandSettings,
    /// Highest bit index accepted for DIGITAL writes.
    digital_bit_max: u8,
}

impl<T: ModbusTransport, C: Clock> CommandService<T, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        executor: Arc<CommandExecutor<T, C>>,
        limiter: Arc<dyn RateLimit>,
        audit: Arc<dyn AuditSink>,
        hub: Arc<BroadcastHub>,
        config: Arc<ConfigTree>,
        clock: C,
        settings: CommandSettings,
        digital_bit_max: u8,
    ) -> Self {
        Self {
            store,
            executor,
            limiter,
            audit,
            hub,
            config,
            clock,
            settings,
            digital_bit_max,
        }
    }

    /// Validate a write intent, persist it as `queued`, enqueue it, and
    /// answer with the command id.
    pub fn create(
        &self,
        principal: &Principal,
        client_ip: Option<&str>,
        request: CreateCommandRequest,
    ) -> Result<CreateResult, CommandError> {
        let plc = self
            .config
            .plc_by_name(&request.plc_name)
            .ok_or_else(|| CommandError::UnknownPlc(request.plc_name.clone()))?;

        // Rate limit per (user, plc, datapoint)
        let user_id = principal.user_id().map(|u| u.0);
        let rate_key = format!(
            "cmd:{}:{}:{}",
            user_id.unwrap_or(0),
            request.plc_name,
            request.datapoint_ref
        );
        let limit = self.limiter.allow(
            &rate_key,
            self.settings.rate_limit_per_minute,
            Duration::from_secs(60),
        );
        if !limit.allowed {
            return Err(CommandError::RateLimited {
                reset_after_s: limit.reset_after.as_secs_f64(),
            });
        }

        let dp = self.config.resolve_datapoint_ref(
            &request.datapoint_ref,
            Some(&request.plc_name),
            None,
        )?;
        if self.config.plc_of_datapoint(dp.id) != Some(plc.id) {
            return Err(CommandError::WrongPlc {
                reference: request.datapoint_ref.clone(),
                plc: request.plc_name.clone(),
            });
        }
        if dp.category != PointCategory::Write {
            return Err(CommandError::NotWritable(request.datapoint_ref.clone()));
        }

        let access = EffectiveAccess::for_principal(&self.config, principal);
        if !access.can_write(ResourceType::Datapoint, dp.id.0) {
            return Err(CommandError::Forbidden {
                action: "write".to_string(),
                resource: "datapoint".to_string(),
            });
        }

        if dp.address < 40000 {
            return Err(CommandError::AddressNotWritable);
        }

        let path = self.config.owner_path(dp);
        let equipment_label = path
            .equipment
            .map(|e| e.name.clone())
            .or_else(|| path.container.map(|c| c.name.clone()));

        let (kind, payload) = match dp.point_type {
            PointType::Digital => {
                if !matches!(request.kind, None | Some(CommandKind::Bit)) {
                    return Err(CommandError::KindMismatch {
                        point_type: PointType::Digital,
                        expected: CommandKind::Bit,
                    });
                }
                let bit = request.bit.ok_or(CommandError::BitRequired)?;
                if bit > self.digital_bit_max {
                    return Err(CommandError::BitOutOfRange(self.digital_bit_max));
                }
                if !matches!(request.value, 0 | 1) {
                    return Err(CommandError::BitValueOutOfRange);
                }
                let allowed = dp.allowed_bits();
                if !allowed.is_empty() && !allowed.contains(&bit) {
                    return Err(CommandError::BitNotAllowed { bit, allowed });
                }
                (
                    CommandKind::Bit,
                    CommandPayload {
                        address: dp.address,
                        value: request.value as u16,
                        bit: Some(bit),
                        bit_label: dp
                            .bit_label(bit)
                            .map(str::to_string)
                            .or_else(|| Some(format!("Bit {bit}"))),
                        datapoint_label: Some(dp.label.clone()),
                        equipment_label,
                        verify: Some(true),
                    },
                )
            }
            PointType::Integer => {
                if !matches!(request.kind, None | Some(CommandKind::Register)) {
                    return Err(CommandError::KindMismatch {
                        point_type: PointType::Integer,
                        expected: CommandKind::Register,
                    });
                }
                if !(0..=65535).contains(&request.value) {
                    return Err(CommandError::ValueOutOfRange);
                }
                (
                    CommandKind::Register,
                    CommandPayload {
                        address: dp.address,
                        value: request.value as u16,
                        bit: None,
                        bit_label: None,
                        datapoint_label: Some(dp.label.clone()),
                        equipment_label,
                        verify: Some(request.verify.unwrap_or(true)),
                    },
                )
            }
            PointType::Real => return Err(CommandError::RealNotWritable),
        };

        let now = self.clock.epoch_ms();
        let command = Command {
            command_id: CommandId::new(),
            plc_name: request.plc_name.clone(),
            datapoint_ref: dp.id.canonical_key(),
            kind,
            payload,
            status: CommandStatus::Queued,
            attempts: 0,
            error: None,
            created_at_ms: now,
            updated_at_ms: now,
            user_id,
            username: principal.username.clone(),
            client_ip: client_ip.map(str::to_string),
        };

        let (command, event) = self.store.transact(|state| {
            let mut meta = Map::new();
            meta.insert("rate_remaining".into(), json!(limit.remaining));
            let event = CommandEvent {
                id: state.peek_command_event_id(),
                command_id: command.command_id.clone(),
                ts_ms: now,
                status: CommandStatus::Queued,
                message: None,
                meta,
            };
            let events = vec![
                Event::CommandCreated { command: command.clone() },
                Event::CommandEventAppended { event: event.clone() },
            ];
            (events, (command.clone(), event))
        })?;

        self.hub.broadcast(Channel::Commands, &command_log_payload(&self.config, &command, Some(&event)));
        self.audit.log(
            "command.create",
            user_id,
            client_ip,
            &request.plc_name,
            json!({
                "command_id": command.command_id,
                "datapoint_ref": command.datapoint_ref,
                "kind": command.kind,
            }),
        );
        tracing::info!(
            command_id = %command.command_id,
            plc = %command.plc_name,
            datapoint = %command.datapoint_ref,
            kind = %command.kind,
            "command queued"
        );

        self.executor.enqueue(&request.plc_name, command.command_id.clone());
        Ok(CreateResult { command_id: command.command_id, status: CommandStatus::Queued })
    }

    /// Cancel a queued command. Executing or terminal commands are left
    /// alone and their current status is returned.
    pub fn cancel(
        &self,
        command_id: &str,
        principal: &Principal,
    ) -> Result<CommandStatus, CommandError> {
        let now = self.clock.epoch_ms();
        let by = principal.username.clone().unwrap_or_else(|| principal.subject.clone());

        let outcome = self.store.transact(|state| {
            let Some(command) = state.commands.get(command_id) else {
                return (vec![], Err(CommandError::NotFound(command_id.to_string())));
            };
            if command.status != CommandStatus::Queued {
                return (vec![], Ok((command.status, None)));
            }
            let mut command = command.clone();
            command.status = CommandStatus::Cancelled;
            command.error = Some("cancelled".to_string());
            command.updated_at_ms = now;

            let mut meta = Map::new();
            meta.insert("by".into(), json!(by));
            let event = CommandEvent {
                id: state.peek_command_event_id(),
                command_id: command.command_id.clone(),
                ts_ms: now,
                status: CommandStatus::Cancelled,
                message: Some("cancelled".to_string()),
                meta,
            };
            let events = vec![
                Event::CommandUpdated {
                    command_id: command.command_id.clone(),
                    status: CommandStatus::Cancelled,
                    attempts: command.attempts,
                    error: command.error.clone(),
                    updated_at_ms: now,
                },
                Event::CommandEventAppended { event: event.clone() },
            ];
            (events, Ok((CommandStatus::Cancelled, Some((command, event)))))
        })??;

        let (status, broadcast) = outcome;
        if let Some((command, event)) = broadcast {
            self.hub
                .broadcast(Channel::Commands, &command_log_payload(&self.config, &command, Some(&event)));
        }
        Ok(status)
    }

    /// One command plus its ordered event timeline.
    pub fn get(&self, command_id: &str) -> Option<(Command, Vec<CommandEvent>)> {
        let state = self.store.read();
        let command = state.commands.get(command_id)?.clone();
        let events = state.events_for_command(command_id).into_iter().cloned().collect();
        Some((command, events))
    }

    /// Filtered command rows, newest first.
    pub fn list(&self, filter: &CommandFilter) -> CommandPage {
        let limit = if filter.limit == 0 { 50 } else { filter.limit.min(200) };
        let state = self.store.read();

        let mut rows: Vec<&Command> = state
            .commands
            .values()
            .filter(|c| filter.plc_name.as_deref().is_none_or(|p| c.plc_name == p))
            .filter(|c| filter.datapoint_ref.as_deref().is_none_or(|d| c.datapoint_ref == d))
            .filter(|c| filter.status.is_none_or(|s| c.status == s))
            .collect();
        rows.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| b.command_id.as_str().cmp(a.command_id.as_str()))
        });

        let total = rows.len();
        let items = rows.into_iter().skip(filter.offset).take(limit).cloned().collect();
        CommandPage { total, items }
    }

    /// Recent command-log payloads for the subscribe-time snapshot.
    pub fn recent_log_payloads(&self, limit: usize) -> Vec<serde_json::Value> {
        let state = self.store.read();
        state
            .command_events
            .values()
            .rev()
            .take(limit)
            .filter_map(|event| {
                state
                    .commands
                    .get(event.command_id.as_str())
                    .map(|command| command_log_payload(&self.config, command, Some(event)))
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "../service_tests.rs"]
mod tests;
