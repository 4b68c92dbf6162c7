// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-PLC FIFO command execution.
//!
//! Queues and workers are created lazily per PLC. Within one PLC,
//! commands run strictly in enqueue order; across PLCs they are
//! independent. The device service serializes register I/O per PLC
//! anyway, so a bit write can never tear against a polling read.

use crate::hub::{command_log_payload, BroadcastHub, Channel};
use serde_json::Map;
use sg_core::{
    register_offset, Clock, Command, CommandEvent, CommandId, CommandKind, CommandStatus,
    ConfigTree, Event,
};
use sg_modbus::{DeviceService, ModbusTransport};
use sg_storage::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Command execution tuning.
#[derive(Debug, Clone)]
pub struct CommandSettings {
    pub max_retries: u32,
    pub backoff: Duration,
    pub rate_limit_per_minute: u32,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self { max_retries: 2, backoff: Duration::from_millis(250), rate_limit_per_minute: 30 }
    }
}

/// How long shutdown waits for each worker to drain.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

struct WorkerHandle {
    tx: mpsc::UnboundedSender<CommandId>,
    handle: JoinHandle<()>,
}

/// Executes persisted write commands, one worker per PLC.
pub struct CommandExecutor<T: ModbusTransport, C: Clock> {
    devices: Arc<DeviceService<T, C>>,
    store: Arc<Store>,
    hub: Arc<BroadcastHub>,
    config: Arc<ConfigTree>,
    clock: C,
    settings: CommandSettings,
    workers: parking_lot::Mutex<HashMap<String, WorkerHandle>>,
    cancel: CancellationToken,
}

impl<T: ModbusTransport, C: Clock> CommandExecutor<T, C> {
    pub fn new(
        devices: Arc<DeviceService<T, C>>,
        store: Arc<Store>,
        hub: Arc<BroadcastHub>,
        config: Arc<ConfigTree>,
        clock: C,
        settings: CommandSettings,
    ) -> Self {
        Self {
            devices,
            store,
            hub,
            config,
            clock,
            settings,
            workers: parking_lot::Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Queue a persisted command for its PLC, starting that PLC's worker
    /// on first use.
    pub fn enqueue(self: &Arc<Self>, plc_name: &str, command_id: CommandId) {
        let mut workers = self.workers.lock();
        let worker = workers.entry(plc_name.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let executor = Arc::clone(self);
            let plc = plc_name.to_string();
            let handle = tokio::spawn(async move { executor.worker_loop(plc, rx).await });
            WorkerHandle { tx, handle }
        });
        if worker.tx.send(command_id.clone()).is_err() {
            tracing::error!(plc = plc_name, command_id = %command_id, "command worker is gone");
        }
    }

    async fn worker_loop(self: Arc<Self>, plc: String, mut rx: mpsc::UnboundedReceiver<CommandId>) {
        tracing::debug!(plc = %plc, "command worker started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                item = rx.recv() => match item {
                    Some(command_id) => self.execute_command(command_id).await,
                    None => break,
                },
            }
        }
        tracing::debug!(plc = %plc, "command worker stopped");
    }

    /// Run one command through its state machine.
    async fn execute_command(&self, command_id: CommandId) {
        let result = self.execute_inner(&command_id).await;
        if let Err(e) = result {
            // A storage failure leaves the command for manual inspection;
            // the worker moves on, commands are independent.
            tracing::error!(command_id = %command_id, error = %e, "command execution aborted");
        }
    }

    async fn execute_inner(&self, command_id: &CommandId) -> Result<(), sg_storage::StoreError> {
        // Claim: queued → executing (skip anything no longer queued)
        let Some((command, event)) = self.transition_to_executing(command_id)? else {
            return Ok(());
        };
        self.broadcast(&command, Some(&event));

        let mut success = false;
        let mut last_error: Option<String> = None;
        let mut attempt = 0u32;

        while attempt <= self.settings.max_retries {
            if self.cancel.is_cancelled() {
                last_error = Some("interrupted by shutdown".to_string());
                break;
            }

            // Reload to observe cancellation between retries
            let Some(current) = self.load(command_id) else {
                return Ok(());
            };
            if current.status == CommandStatus::Cancelled {
                tracing::info!(command_id = %command_id, "command cancelled, stopping");
                return Ok(());
            }

            self.record_attempt(&current)?;

            match self.dispatch(&current).await {
                Ok(()) => {
                    success = true;
                    break;
                }
                Err(DispatchError::Fatal(message)) => {
                    last_error = Some(message);
                    break;
                }
                Err(DispatchError::Device(message)) => {
                    last_error = Some(message);
                }
            }

            if attempt < self.settings.max_retries {
                let delay = self.settings.backoff * (attempt + 1);
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            attempt += 1;
        }

        // Terminal transition with its event row
        let status = if success { CommandStatus::Success } else { CommandStatus::Failed };
        let error = if success { None } else { last_error };
        if let Some((command, event)) = self.finalize(command_id, status, error)? {
            self.broadcast(&command, Some(&event));
        }
        Ok(())
    }

    fn load(&self, command_id: &CommandId) -> Option<Command> {
        self.store.read().commands.get(command_id.as_str()).cloned()
    }

    fn transition_to_executing(
        &self,
        command_id: &CommandId,
    ) -> Result<Option<(Command, CommandEvent)>, sg_storage::StoreError> {
        let now = self.clock.epoch_ms();
        self.store.transact(|state| {
            let Some(command) = state.commands.get(command_id.as_str()) else {
                return (vec![], None);
            };
            if command.status != CommandStatus::Queued {
                return (vec![], None);
            }
            let mut command = command.clone();
            command.status = CommandStatus::Executing;
            command.updated_at_ms = now;

            let event = CommandEvent {
                id: state.peek_command_event_id(),
                command_id: command.command_id.clone(),
                ts_ms: now,
                status: CommandStatus::Executing,
                message: None,
                meta: Map::new(),
            };
            let events = vec![
                Event::CommandUpdated {
                    command_id: command.command_id.clone(),
                    status: CommandStatus::Executing,
                    attempts: command.attempts,
                    error: None,
                    updated_at_ms: now,
                },
                Event::CommandEventAppended { event: event.clone() },
            ];
            (events, Some((command, event)))
        })
    }

    fn record_attempt(&self, command: &Command) -> Result<(), sg_storage::StoreError> {
        let now = self.clock.epoch_ms();
        self.store.transact(|state| {
            let Some(current) = state.commands.get(command.command_id.as_str()) else {
                return (vec![], ());
            };
            (
                vec![Event::CommandUpdated {
                    command_id: current.command_id.clone(),
                    status: current.status,
                    attempts: current.attempts + 1,
                    error: current.error.clone(),
                    updated_at_ms: now,
                }],
                (),
            )
        })
    }

    fn finalize(
        &self,
        command_id: &CommandId,
        status: CommandStatus,
        error: Option<String>,
    ) -> Result<Option<(Command, CommandEvent)>, sg_storage::StoreError> {
        let now = self.clock.epoch_ms();
        self.store.transact(|state| {
            let Some(command) = state.commands.get(command_id.as_str()) else {
                return (vec![], None);
            };
            // Cancellation won the race; its terminal event already exists
            if command.status.is_terminal() {
                return (vec![], None);
            }
            let mut command = command.clone();
            command.status = status;
            command.error = error.clone();
            command.updated_at_ms = now;

            let event = CommandEvent {
                id: state.peek_command_event_id(),
                command_id: command.command_id.clone(),
                ts_ms: now,
                status,
                message: error.clone(),
                meta: Map::new(),
            };
            let events = vec![
                Event::CommandUpdated {
                    command_id: command.command_id.clone(),
                    status,
                    attempts: command.attempts,
                    error,
                    updated_at_ms: now,
                },
                Event::CommandEventAppended { event: event.clone() },
            ];
            (events, Some((command, event)))
        })
    }

    /// Perform the write the command describes.
    async fn dispatch(&self, command: &Command) -> Result<(), DispatchError> {
        let payload = &command.payload;
        let Some(offset) = register_offset(payload.address) else {
            return Err(DispatchError::Fatal(format!(
                "address {} is not a holding register",
                payload.address
            )));
        };

        match command.kind {
            CommandKind::Bit => {
                let Some(bit) = payload.bit else {
                    return Err(DispatchError::Fatal("missing bit for bit write".to_string()));
                };
                self.devices
                    .write_bit_in_register(
                        &command.plc_name,
                        offset,
                        bit,
                        payload.value != 0,
                        true,
                    )
                    .await
                    .map_err(|e| DispatchError::Device(e.to_string()))
            }
            CommandKind::Register => {
                let verify = payload.verify.unwrap_or(true);
                self.devices
                    .write_register(&command.plc_name, offset, payload.value, verify)
                    .await
                    .map_err(|e| DispatchError::Device(e.to_string()))
            }
        }
    }

    fn broadcast(&self, command: &Command, event: Option<&CommandEvent>) {
        let payload = command_log_payload(&self.config, command, event);
        self.hub.broadcast(Channel::Commands, &payload);
    }

    /// Stop all workers, waiting a bounded time for each.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let workers: Vec<(String, WorkerHandle)> = self.workers.lock().drain().collect();
        for (plc, mut worker) in workers {
            drop(worker.tx);
            if tokio::time::timeout(WORKER_JOIN_TIMEOUT, &mut worker.handle).await.is_err() {
                tracing::warn!(plc = %plc, "command worker did not stop in time, aborting");
                worker.handle.abort();
            }
        }
    }
}

enum DispatchError {
    /// Configuration-shaped problems that retrying cannot fix.
    Fatal(String),
    /// Device-level failures, retried with backoff.
    Device(String),
}

#[cfg(test)]
#[path = "../executor_tests.rs"]
mod tests;
