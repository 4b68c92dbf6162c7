// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The current-value cache: latest decoded tree per PLC.
//!
//! Entries are replaced wholesale once per polling cycle. Readers get
//! `Arc` handles and must treat trees as immutable; a retained handle
//! stays valid across later ticks.

use parking_lot::Mutex;
use sg_core::PlcSnapshot;
use std::collections::HashMap;
use std::sync::Arc;

/// Thread-safe map of PLC name → latest snapshot.
#[derive(Default)]
pub struct SnapshotStore {
    inner: Mutex<HashMap<String, Arc<PlcSnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for the snapshot's PLC atomically.
    pub fn put(&self, snapshot: PlcSnapshot) {
        self.inner.lock().insert(snapshot.plc.clone(), Arc::new(snapshot));
    }

    pub fn get(&self, plc: &str) -> Option<Arc<PlcSnapshot>> {
        self.inner.lock().get(plc).cloned()
    }

    /// The entry for `plc`, or the sentinel "no data" snapshot.
    pub fn get_or_no_data(&self, plc: &str) -> Arc<PlcSnapshot> {
        self.get(plc).unwrap_or_else(|| Arc::new(PlcSnapshot::no_data(plc)))
    }

    /// A shallow copy of the whole map.
    pub fn get_all(&self) -> HashMap<String, Arc<PlcSnapshot>> {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
