// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-PLC polling workers.
//!
//! Each enabled PLC gets an independent loop: execute the (cached) scan
//! plan through the device service, decode, publish the tree wholesale
//! into the snapshot store, and feed the numeric readings to the alarm
//! engine. A failed block read only drops that block's tags for the
//! cycle; there is no cycle-level retry.

use crate::alarms::{AlarmEngine, NumericReading};
use crate::snapshot::SnapshotStore;
use parking_lot::Mutex;
use sg_core::scan::{build_blocks, build_tag_specs};
use sg_core::{
    point, Clock, ConfigTree, OwnerRef, Plc, PlcId, PlcSnapshot, PointReading, ScanPlan,
};
use sg_modbus::{DeviceService, ModbusTransport};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Polling tuning.
///
/// The REAL extra offset is not a knob here: it lives on the
/// configuration tree, which was validated against it.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Duration,
    pub max_block_regs: u16,
    pub max_gap_regs: u16,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_block_regs: sg_core::scan::MAX_BLOCK_REGS,
            max_gap_regs: sg_core::scan::MAX_GAP_REGS,
        }
    }
}

/// Periodic reader for every enabled PLC.
pub struct Poller<T: ModbusTransport, C: Clock> {
    devices: Arc<DeviceService<T, C>>,
    snapshots: Arc<SnapshotStore>,
    alarms: Arc<AlarmEngine<C>>,
    config: Arc<ConfigTree>,
    clock: C,
    settings: PollerSettings,
    plans: Mutex<HashMap<PlcId, Arc<ScanPlan>>>,
}

impl<T: ModbusTransport, C: Clock> Poller<T, C> {
    pub fn new(
        devices: Arc<DeviceService<T, C>>,
        snapshots: Arc<SnapshotStore>,
        alarms: Arc<AlarmEngine<C>>,
        config: Arc<ConfigTree>,
        clock: C,
        settings: PollerSettings,
    ) -> Self {
        Self {
            devices,
            snapshots,
            alarms,
            config,
            clock,
            settings,
            plans: Mutex::new(HashMap::new()),
        }
    }

    /// Drop cached scan plans so the next cycle rebuilds them.
    pub fn invalidate_plans(&self) {
        self.plans.lock().clear();
    }

    fn plan_for(&self, plc: PlcId) -> Arc<ScanPlan> {
        let mut plans = self.plans.lock();
        Arc::clone(plans.entry(plc).or_insert_with(|| {
            let datapoints = self.config.datapoints_for_plc(plc);
            let tags =
                build_tag_specs(datapoints.iter().copied(), self.config.real_extra_offset());
            // Validation guarantees every datapoint is plannable for the
            // tree's offset; a drop here is a configuration bug, not a
            // quiet omission.
            for dp in &datapoints {
                if !tags.iter().any(|tag| tag.datapoint_id == dp.id) {
                    tracing::warn!(
                        plc = %plc,
                        datapoint_id = %dp.id,
                        label = %dp.label,
                        address = dp.address,
                        "datapoint excluded from scan plan, registers not addressable"
                    );
                }
            }
            let blocks =
                build_blocks(&tags, self.settings.max_block_regs, self.settings.max_gap_regs);
            tracing::debug!(plc = %plc, tags = tags.len(), blocks = blocks.len(), "scan plan built");
            Arc::new(ScanPlan { tags, blocks })
        }))
    }

    /// Spawn one worker per enabled PLC. Workers observe `cancel` within
    /// one tick slice.
    pub fn spawn(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.config
            .plcs()
            .iter()
            .filter(|plc| plc.enabled)
            .map(|plc| {
                let poller = Arc::clone(self);
                let plc = plc.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { poller.run_loop(plc, cancel).await })
            })
            .collect()
    }

    async fn run_loop(self: Arc<Self>, plc: Plc, cancel: CancellationToken) {
        tracing::info!(plc = %plc.name, interval = ?self.settings.interval, "poller started");
        loop {
            self.poll_once(&plc).await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }
        tracing::info!(plc = %plc.name, "poller stopped");
    }

    /// Run one polling cycle for a PLC.
    pub async fn poll_once(&self, plc: &Plc) {
        let plan = self.plan_for(plc.id);
        if plan.tags.is_empty() {
            return;
        }

        // Read blocks into a register map; failed blocks drop their tags
        let mut words: HashMap<u16, u16> = HashMap::new();
        for block in &plan.blocks {
            match self.devices.read_holding_registers(&plc.name, block.start, block.count).await {
                Ok(regs) => {
                    for (i, word) in regs.into_iter().enumerate() {
                        words.insert(block.start + i as u16, word);
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        plc = %plc.name,
                        start = block.start,
                        count = block.count,
                        error = %e,
                        "block read failed"
                    );
                }
            }
        }

        let mut snapshot = PlcSnapshot::new(&plc.name, self.clock.epoch_ms());
        let mut readings = Vec::new();

        for tag in &plan.tags {
            let Some(dp) = self.config.datapoint(tag.datapoint_id) else {
                continue;
            };
            let Some(tag_words) = collect_words(&words, tag.read_offset, tag.length) else {
                continue;
            };
            let Some(value) = point::decode_tag(tag, dp, &tag_words) else {
                continue;
            };

            if let Some(numeric) = value.numeric() {
                readings.push(NumericReading {
                    datapoint_id: dp.id,
                    label: dp.label.clone(),
                    value: numeric,
                });
            }

            let reading = PointReading {
                id: dp.id,
                description: dp.description.clone(),
                register_address: dp.address,
                value,
            };

            match dp.owner {
                OwnerRef::Plc(_) => {
                    snapshot.datapoints.insert(dp.label.clone(), reading);
                }
                OwnerRef::Container(container_id) => {
                    let Some(container) = self.config.container(container_id) else {
                        continue;
                    };
                    snapshot
                        .containers
                        .entry(container.name.clone())
                        .or_default()
                        .datapoints
                        .insert(dp.label.clone(), reading);
                }
                OwnerRef::Equipment(equipment_id) => {
                    let Some(equipment) = self.config.equipment(equipment_id) else {
                        continue;
                    };
                    let Some(container) = self.config.container(equipment.container_id) else {
                        continue;
                    };
                    snapshot
                        .containers
                        .entry(container.name.clone())
                        .or_default()
                        .equipment
                        .entry(equipment.name.clone())
                        .or_default()
                        .datapoints
                        .insert(dp.label.clone(), reading);
                }
            }
        }

        tracing::debug!(plc = %plc.name, leaves = snapshot.leaf_count(), "cycle complete");
        self.snapshots.put(snapshot);
        self.alarms.process_readings(&plc.name, &readings);
    }
}

fn collect_words(words: &HashMap<u16, u16>, start: u16, length: u16) -> Option<Vec<u16>> {
    (0..length).map(|i| words.get(&(start + i)).copied()).collect()
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
