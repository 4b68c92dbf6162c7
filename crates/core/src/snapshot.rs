// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-PLC snapshot trees: the latest decoded reading for every datapoint,
//! shaped by the configuration tree (PLC → containers → equipment).
//!
//! Published trees are never mutated in place; the poller replaces a PLC's
//! entry wholesale each cycle, so readers may retain references across
//! ticks.

use crate::point::PointReading;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Readings for one equipment node, keyed by datapoint label.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EquipmentSnapshot {
    #[serde(default)]
    pub datapoints: IndexMap<String, PointReading>,
}

/// Readings for one container, keyed by label / equipment name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    #[serde(default)]
    pub datapoints: IndexMap<String, PointReading>,
    #[serde(default)]
    pub equipment: IndexMap<String, EquipmentSnapshot>,
}

/// The decoded reading tree for one PLC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlcSnapshot {
    pub plc: String,
    /// Epoch milliseconds of the cycle that produced this tree; `None` for
    /// the sentinel "no data" snapshot.
    pub timestamp_ms: Option<u64>,
    #[serde(default)]
    pub datapoints: IndexMap<String, PointReading>,
    #[serde(default)]
    pub containers: IndexMap<String, ContainerSnapshot>,
}

impl PlcSnapshot {
    /// An empty tree stamped with the producing cycle's time.
    pub fn new(plc: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            plc: plc.into(),
            timestamp_ms: Some(timestamp_ms),
            datapoints: IndexMap::new(),
            containers: IndexMap::new(),
        }
    }

    /// Sentinel for a PLC that has not produced data yet.
    pub fn no_data(plc: impl Into<String>) -> Self {
        Self {
            plc: plc.into(),
            timestamp_ms: None,
            datapoints: IndexMap::new(),
            containers: IndexMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.datapoints.is_empty() && self.containers.is_empty()
    }

    /// Number of leaves across the whole tree.
    pub fn leaf_count(&self) -> usize {
        self.datapoints.len()
            + self
                .containers
                .values()
                .map(|c| {
                    c.datapoints.len()
                        + c.equipment.values().map(|e| e.datapoints.len()).sum::<usize>()
                })
                .sum::<usize>()
    }
}
