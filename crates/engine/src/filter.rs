// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access-filtered snapshot reads.
//!
//! Every read that crosses the request boundary goes through here: the
//! principal's effective access decides which PLCs appear and which
//! leaves survive, and branches left empty by filtering are pruned.

use crate::snapshot::SnapshotStore;
use sg_core::{ConfigTree, EffectiveAccess, PlcSnapshot, ResourceType};

/// The filtered snapshot for one principal: one tree per readable PLC,
/// in configuration order, with unreadable leaves and empty branches
/// removed. PLCs without data yet appear as the sentinel snapshot.
pub fn filtered_snapshot(
    config: &ConfigTree,
    snapshots: &SnapshotStore,
    access: &EffectiveAccess,
) -> Vec<PlcSnapshot> {
    config
        .plcs()
        .iter()
        .filter(|plc| access.can_read(ResourceType::Plc, plc.id.0))
        .map(|plc| {
            let mut tree: PlcSnapshot = (*snapshots.get_or_no_data(&plc.name)).clone();
            prune(&mut tree, access);
            tree
        })
        .collect()
}

fn prune(tree: &mut PlcSnapshot, access: &EffectiveAccess) {
    tree.datapoints.retain(|_, reading| access.can_read_datapoint(reading.id));
    for container in tree.containers.values_mut() {
        container.datapoints.retain(|_, reading| access.can_read_datapoint(reading.id));
        for equipment in container.equipment.values_mut() {
            equipment.datapoints.retain(|_, reading| access.can_read_datapoint(reading.id));
        }
        container.equipment.retain(|_, equipment| !equipment.datapoints.is_empty());
    }
    tree.containers
        .retain(|_, container| !container.datapoints.is_empty() || !container.equipment.is_empty());
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
