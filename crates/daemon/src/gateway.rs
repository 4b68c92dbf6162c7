// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The gateway facade: singleton wiring, lifecycle, and the operation
//! surface consumed by external transports (REST, WebSocket, admin).

use crate::config::GatewayConfig;
use sg_core::{
    AlarmOccurrence, Clock, ConfigTree, EffectiveAccess, PlcSnapshot, Principal,
};
use sg_engine::{
    filtered_snapshot, AckTarget, AlarmEngine, AlarmError, BroadcastHub, Channel, CommandError,
    CommandExecutor, CommandFilter, CommandPage, CommandService, CreateAlarmRequest,
    CreateCommandRequest, CreateResult, HistoryQuery, Poller, SnapshotStore, Subscription,
    TracingAudit, WindowLimiter,
};
use sg_modbus::{DeviceService, ModbusTransport, PlcEndpoint, PlcHealth};
use sg_storage::{Store, StoreError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for each poller to stop.
const POLLER_JOIN_TIMEOUT: Duration = Duration::from_secs(3);
/// Cadence of background state checkpoints.
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(300);
/// Command events included in the subscribe-time snapshot.
const COMMAND_SNAPSHOT_EVENTS: usize = 50;

/// Errors from gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway is not started")]
    NotStarted,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Alarm(#[from] AlarmError),
}

struct Runtime<T: ModbusTransport, C: Clock> {
    store: Arc<Store>,
    devices: Arc<DeviceService<T, C>>,
    snapshots: Arc<SnapshotStore>,
    hub: Arc<BroadcastHub>,
    alarms: Arc<AlarmEngine<C>>,
    executor: Arc<CommandExecutor<T, C>>,
    commands: CommandService<T, C>,
    poller: Arc<Poller<T, C>>,
    poll_handles: Vec<JoinHandle<()>>,
    checkpoint_handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// The process-wide gateway: built once at startup, torn down once.
///
/// Construction performs no I/O; `start()` opens the store and spawns
/// the workers, `shutdown()` joins them with a bounded deadline.
pub struct Gateway<T: ModbusTransport, C: Clock> {
    config: GatewayConfig,
    tree: Arc<ConfigTree>,
    transport: T,
    clock: C,
    runtime: Option<Runtime<T, C>>,
}

impl<T: ModbusTransport, C: Clock> Gateway<T, C> {
    pub fn new(
        config: GatewayConfig,
        transport: T,
        clock: C,
    ) -> Result<Self, crate::config::ConfigFileError> {
        let tree = Arc::new(config.build_tree()?);
        Ok(Self { config, tree, transport, clock, runtime: None })
    }

    pub fn tree(&self) -> &Arc<ConfigTree> {
        &self.tree
    }

    pub fn is_started(&self) -> bool {
        self.runtime.is_some()
    }

    /// Open durable state and start the background workers.
    pub async fn start(&mut self) -> Result<(), GatewayError> {
        if self.runtime.is_some() {
            return Ok(());
        }

        let store = Arc::new(Store::open(&self.config.state_dir)?);
        let devices = Arc::new(DeviceService::new(
            self.transport.clone(),
            self.clock.clone(),
            self.config.modbus_settings(),
            self.tree.plcs().iter().map(PlcEndpoint::from).collect::<Vec<_>>(),
        ));
        let snapshots = Arc::new(SnapshotStore::new());
        let hub = Arc::new(BroadcastHub::new());
        let alarms = Arc::new(AlarmEngine::new(
            Arc::clone(&store),
            Arc::clone(&self.tree),
            Arc::clone(&hub),
            self.clock.clone(),
        ));
        let executor = Arc::new(CommandExecutor::new(
            Arc::clone(&devices),
            Arc::clone(&store),
            Arc::clone(&hub),
            Arc::clone(&self.tree),
            self.clock.clone(),
            self.config.command_settings(),
        ));
        let commands = CommandService::new(
            Arc::clone(&store),
            Arc::clone(&executor),
            Arc::new(WindowLimiter::new(self.clock.clone())),
            Arc::new(TracingAudit),
            Arc::clone(&hub),
            Arc::clone(&self.tree),
            self.clock.clone(),
            self.config.command_settings(),
            self.config.alarms.digital_bit_max,
        );
        let poller = Arc::new(Poller::new(
            Arc::clone(&devices),
            Arc::clone(&snapshots),
            Arc::clone(&alarms),
            Arc::clone(&self.tree),
            self.clock.clone(),
            self.config.poller_settings(),
        ));

        let cancel = CancellationToken::new();
        let poll_handles =
            if self.config.polling.enabled { poller.spawn(&cancel) } else { Vec::new() };

        let checkpoint_handle = {
            let store = Arc::clone(&store);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(CHECKPOINT_INTERVAL) => {
                            if let Err(e) = store.checkpoint() {
                                tracing::error!(error = %e, "periodic checkpoint failed");
                            }
                        }
                    }
                }
            })
        };

        tracing::info!(
            plcs = self.tree.plcs().len(),
            polling = self.config.polling.enabled,
            state_dir = %self.config.state_dir.display(),
            "gateway started"
        );
        self.runtime = Some(Runtime {
            store,
            devices,
            snapshots,
            hub,
            alarms,
            executor,
            commands,
            poller,
            poll_handles,
            checkpoint_handle,
            cancel,
        });
        Ok(())
    }

    /// Stop workers with a bounded deadline, then checkpoint state.
    pub async fn shutdown(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        runtime.cancel.cancel();
        for mut handle in runtime.poll_handles {
            if tokio::time::timeout(POLLER_JOIN_TIMEOUT, &mut handle).await.is_err() {
                tracing::warn!("poller did not stop in time, aborting");
                handle.abort();
            }
        }
        runtime.checkpoint_handle.abort();
        runtime.executor.shutdown().await;
        runtime.devices.close_all().await;
        if let Err(e) = runtime.store.checkpoint() {
            tracing::error!(error = %e, "final checkpoint failed");
        }
        tracing::info!("gateway stopped");
    }

    fn runtime(&self) -> Result<&Runtime<T, C>, GatewayError> {
        self.runtime.as_ref().ok_or(GatewayError::NotStarted)
    }

    // ---- snapshot reads ----

    /// The filtered current-value trees for a principal, empty branches
    /// pruned.
    pub fn get_filtered_snapshot(
        &self,
        principal: &Principal,
    ) -> Result<Vec<PlcSnapshot>, GatewayError> {
        let runtime = self.runtime()?;
        let access = EffectiveAccess::for_principal(&self.tree, principal);
        Ok(filtered_snapshot(&self.tree, &runtime.snapshots, &access))
    }

    /// Per-PLC device health.
    pub fn health_snapshot(&self) -> Result<BTreeMap<String, PlcHealth>, GatewayError> {
        Ok(self.runtime()?.devices.health_snapshot())
    }

    // ---- commands ----

    pub fn create_command(
        &self,
        principal: &Principal,
        client_ip: Option<&str>,
        request: CreateCommandRequest,
    ) -> Result<CreateResult, GatewayError> {
        Ok(self.runtime()?.commands.create(principal, client_ip, request)?)
    }

    pub fn cancel_command(
        &self,
        command_id: &str,
        principal: &Principal,
    ) -> Result<sg_core::CommandStatus, GatewayError> {
        Ok(self.runtime()?.commands.cancel(command_id, principal)?)
    }

    pub fn get_command(
        &self,
        command_id: &str,
    ) -> Result<Option<(sg_core::Command, Vec<sg_core::CommandEvent>)>, GatewayError> {
        Ok(self.runtime()?.commands.get(command_id))
    }

    pub fn list_commands(&self, filter: &CommandFilter) -> Result<CommandPage, GatewayError> {
        Ok(self.runtime()?.commands.list(filter))
    }

    // ---- alarms ----

    pub fn create_alarm(
        &self,
        request: CreateAlarmRequest,
    ) -> Result<sg_engine::SetStateOutcome, GatewayError> {
        Ok(self.runtime()?.alarms.create_alarm(request)?)
    }

    pub fn acknowledge_alarm(
        &self,
        target: AckTarget,
        acknowledged: bool,
        user_id: Option<u32>,
        client_ip: Option<&str>,
        note: Option<&str>,
    ) -> Result<AlarmOccurrence, GatewayError> {
        Ok(self.runtime()?.alarms.acknowledge(target, acknowledged, user_id, client_ip, note)?)
    }

    pub fn list_active_alarms(&self) -> Result<Vec<serde_json::Value>, GatewayError> {
        Ok(self.runtime()?.alarms.active_snapshot())
    }

    pub fn query_alarm_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<sg_core::AlarmEventRecord>, GatewayError> {
        Ok(self.runtime()?.alarms.query_history(query))
    }

    // ---- subscriptions ----

    /// Subscribe to alarm transitions. The handle's first payload is the
    /// active-alarm snapshot, so a reconnecting client resyncs
    /// immediately.
    pub fn subscribe_alarms(&self) -> Result<Subscription, GatewayError> {
        let runtime = self.runtime()?;
        let initial = sg_engine::hub::snapshot_payload(
            Channel::Alarms,
            runtime.alarms.active_snapshot(),
            self.clock.epoch_ms(),
        );
        Ok(runtime.hub.subscribe(Channel::Alarms, Some(initial)))
    }

    /// Subscribe to command logs, seeded with the most recent events.
    pub fn subscribe_commands(&self) -> Result<Subscription, GatewayError> {
        let runtime = self.runtime()?;
        let initial = sg_engine::hub::snapshot_payload(
            Channel::Commands,
            runtime.commands.recent_log_payloads(COMMAND_SNAPSHOT_EVENTS),
            self.clock.epoch_ms(),
        );
        Ok(runtime.hub.subscribe(Channel::Commands, Some(initial)))
    }

    pub fn unsubscribe(&self, id: &sg_engine::SubscriberId) -> Result<(), GatewayError> {
        self.runtime()?.hub.unsubscribe(id);
        Ok(())
    }

    /// Drop cached scan plans (configuration caches) so the next cycle
    /// rebuilds them.
    pub fn invalidate_plan_cache(&self) -> Result<(), GatewayError> {
        self.runtime()?.poller.invalidate_plans();
        Ok(())
    }

    /// Run one polling cycle for a PLC immediately. Used by admin
    /// tooling and tests that drive cycles explicitly.
    pub async fn poll_plc_once(&self, plc: &sg_core::Plc) -> Result<(), GatewayError> {
        self.runtime()?.poller.poll_once(plc).await;
        Ok(())
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
