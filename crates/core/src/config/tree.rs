// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The validated, indexed configuration tree.

use super::model::{
    Container, ContainerId, DataPoint, DataPointId, Equipment, EquipmentId, OwnerRef, Plc, PlcId,
};
use super::validate::{self, ConfigError};
use crate::access::Grant;
use crate::alarm::AlarmRule;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Prefix of the canonical datapoint reference string.
pub const CANONICAL_DP_PREFIX: &str = "db-dp:";

impl DataPointId {
    /// Canonical reference string, `db-dp:<id>`.
    pub fn canonical_key(self) -> String {
        format!("{CANONICAL_DP_PREFIX}{}", self.0)
    }

    /// Parse a canonical reference (`db-dp:<id>`) or a bare numeric id.
    pub fn parse_reference(text: &str) -> Option<DataPointId> {
        let text = text.trim();
        let digits = text.strip_prefix(CANONICAL_DP_PREFIX).unwrap_or(text);
        digits.parse::<u32>().ok().map(DataPointId)
    }
}

/// A datapoint that matched an ambiguous legacy lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatapointCandidate {
    pub id: DataPointId,
    pub label: String,
    pub owner_type: String,
    pub owner_id: u32,
}

/// Failure to resolve a datapoint reference.
///
/// Ambiguity is never resolved by guessing: the caller gets the candidate
/// list and must rescope.
#[derive(Debug, Clone, Error)]
pub enum DatapointRefError {
    #[error("datapoint '{reference}' not found")]
    NotFound { reference: String },
    #[error("ambiguous datapoint identifier '{reference}' ({} candidates)", candidates.len())]
    Ambiguous { reference: String, candidates: Vec<DatapointCandidate> },
}

/// Resolved ancestry of a datapoint, for display context.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerPath<'a> {
    pub plc: Option<&'a Plc>,
    pub container: Option<&'a Container>,
    pub equipment: Option<&'a Equipment>,
}

/// The full configuration tree with lookup indexes.
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    plcs: Vec<Plc>,
    containers: Vec<Container>,
    equipment: Vec<Equipment>,
    datapoints: Vec<DataPoint>,
    grants: Vec<Grant>,
    rules: Vec<AlarmRule>,
    /// Extra register offset applied to REAL reads; addresses were
    /// validated against this value, and scan planning must use it.
    real_extra_offset: u16,

    plc_index: HashMap<PlcId, usize>,
    plc_name_index: HashMap<String, usize>,
    container_index: HashMap<ContainerId, usize>,
    equipment_index: HashMap<EquipmentId, usize>,
    datapoint_index: HashMap<DataPointId, usize>,

    containers_by_plc: HashMap<PlcId, Vec<ContainerId>>,
    equipment_by_container: HashMap<ContainerId, Vec<EquipmentId>>,
    datapoints_by_owner: HashMap<OwnerRef, Vec<DataPointId>>,
    rules_by_datapoint: HashMap<DataPointId, Vec<usize>>,
}

impl ConfigTree {
    /// Validate and index a configuration tree with the default REAL
    /// extra offset.
    pub fn new(
        plcs: Vec<Plc>,
        containers: Vec<Container>,
        equipment: Vec<Equipment>,
        datapoints: Vec<DataPoint>,
        grants: Vec<Grant>,
        rules: Vec<AlarmRule>,
    ) -> Result<Self, ConfigError> {
        Self::with_real_extra_offset(
            plcs,
            containers,
            equipment,
            datapoints,
            grants,
            rules,
            crate::scan::DEFAULT_REAL_EXTRA_OFFSET,
        )
    }

    /// Validate and index a configuration tree against the configured
    /// REAL extra offset.
    ///
    /// Addresses are checked so that every register a scan plan derived
    /// from this tree will touch is addressable; a tree built with one
    /// offset must not be planned with another.
    pub fn with_real_extra_offset(
        plcs: Vec<Plc>,
        containers: Vec<Container>,
        equipment: Vec<Equipment>,
        datapoints: Vec<DataPoint>,
        grants: Vec<Grant>,
        rules: Vec<AlarmRule>,
        real_extra_offset: u16,
    ) -> Result<Self, ConfigError> {
        validate::validate(
            &plcs,
            &containers,
            &equipment,
            &datapoints,
            &grants,
            &rules,
            real_extra_offset,
        )?;

        let mut tree = Self {
            plcs,
            containers,
            equipment,
            datapoints,
            grants,
            rules,
            real_extra_offset,
            ..Self::default()
        };

        for (idx, plc) in tree.plcs.iter().enumerate() {
            tree.plc_index.insert(plc.id, idx);
            tree.plc_name_index.insert(plc.name.clone(), idx);
        }
        for (idx, container) in tree.containers.iter().enumerate() {
            tree.container_index.insert(container.id, idx);
            tree.containers_by_plc.entry(container.plc_id).or_default().push(container.id);
        }
        for (idx, equipment) in tree.equipment.iter().enumerate() {
            tree.equipment_index.insert(equipment.id, idx);
            tree.equipment_by_container
                .entry(equipment.container_id)
                .or_default()
                .push(equipment.id);
        }
        for (idx, dp) in tree.datapoints.iter().enumerate() {
            tree.datapoint_index.insert(dp.id, idx);
            tree.datapoints_by_owner.entry(dp.owner).or_default().push(dp.id);
        }
        for (idx, rule) in tree.rules.iter().enumerate() {
            tree.rules_by_datapoint.entry(rule.datapoint_id).or_default().push(idx);
        }

        Ok(tree)
    }

    pub fn plcs(&self) -> &[Plc] {
        &self.plcs
    }

    /// The REAL extra offset this tree's addresses were validated for.
    pub fn real_extra_offset(&self) -> u16 {
        self.real_extra_offset
    }

    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    pub fn rules(&self) -> &[AlarmRule] {
        &self.rules
    }

    pub fn plc(&self, id: PlcId) -> Option<&Plc> {
        self.plc_index.get(&id).map(|&i| &self.plcs[i])
    }

    pub fn plc_by_name(&self, name: &str) -> Option<&Plc> {
        self.plc_name_index.get(name).map(|&i| &self.plcs[i])
    }

    pub fn container(&self, id: ContainerId) -> Option<&Container> {
        self.container_index.get(&id).map(|&i| &self.containers[i])
    }

    pub fn equipment(&self, id: EquipmentId) -> Option<&Equipment> {
        self.equipment_index.get(&id).map(|&i| &self.equipment[i])
    }

    pub fn datapoint(&self, id: DataPointId) -> Option<&DataPoint> {
        self.datapoint_index.get(&id).map(|&i| &self.datapoints[i])
    }

    pub fn containers_of_plc(&self, id: PlcId) -> impl Iterator<Item = ContainerId> + '_ {
        self.containers_by_plc.get(&id).into_iter().flatten().copied()
    }

    pub fn equipment_of_container(&self, id: ContainerId) -> impl Iterator<Item = EquipmentId> + '_ {
        self.equipment_by_container.get(&id).into_iter().flatten().copied()
    }

    pub fn datapoints_of(&self, owner: OwnerRef) -> impl Iterator<Item = DataPointId> + '_ {
        self.datapoints_by_owner.get(&owner).into_iter().flatten().copied()
    }

    /// Enabled rules attached to a datapoint, in configuration order.
    pub fn rules_for(&self, id: DataPointId) -> impl Iterator<Item = &AlarmRule> {
        self.rules_by_datapoint
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&i| &self.rules[i])
            .filter(|r| r.enabled)
    }

    fn push_datapoints_of<'a>(&'a self, owner: OwnerRef, out: &mut Vec<&'a DataPoint>) {
        for dp_id in self.datapoints_of(owner) {
            if let Some(dp) = self.datapoint(dp_id) {
                out.push(dp);
            }
        }
    }

    /// All datapoints owned by a PLC or any of its descendants, in tree order.
    pub fn datapoints_for_plc(&self, id: PlcId) -> Vec<&DataPoint> {
        let mut out = Vec::new();

        self.push_datapoints_of(OwnerRef::Plc(id), &mut out);
        for container in self.containers_of_plc(id) {
            self.push_datapoints_of(OwnerRef::Container(container), &mut out);
            for equipment in self.equipment_of_container(container) {
                self.push_datapoints_of(OwnerRef::Equipment(equipment), &mut out);
            }
        }
        out
    }

    /// The PLC a datapoint ultimately belongs to.
    pub fn plc_of_datapoint(&self, id: DataPointId) -> Option<PlcId> {
        let dp = self.datapoint(id)?;
        match dp.owner {
            OwnerRef::Plc(plc_id) => Some(plc_id),
            OwnerRef::Container(c_id) => self.container(c_id).map(|c| c.plc_id),
            OwnerRef::Equipment(e_id) => {
                let equipment = self.equipment(e_id)?;
                self.container(equipment.container_id).map(|c| c.plc_id)
            }
        }
    }

    /// Resolve a datapoint's ancestry for display context.
    pub fn owner_path(&self, dp: &DataPoint) -> OwnerPath<'_> {
        match dp.owner {
            OwnerRef::Plc(plc_id) => OwnerPath { plc: self.plc(plc_id), ..OwnerPath::default() },
            OwnerRef::Container(c_id) => {
                let container = self.container(c_id);
                OwnerPath {
                    plc: container.and_then(|c| self.plc(c.plc_id)),
                    container,
                    equipment: None,
                }
            }
            OwnerRef::Equipment(e_id) => {
                let equipment = self.equipment(e_id);
                let container = equipment.and_then(|e| self.container(e.container_id));
                OwnerPath { plc: container.and_then(|c| self.plc(c.plc_id)), container, equipment }
            }
        }
    }

    /// Resolve a datapoint reference: `db-dp:<id>`, a bare numeric id, or a
    /// legacy label scoped by PLC name and optionally by owner.
    ///
    /// Scoped label lookups that still match multiple datapoints fail with
    /// the candidate list; a candidate is never picked silently.
    pub fn resolve_datapoint_ref(
        &self,
        reference: &str,
        plc_name: Option<&str>,
        owner: Option<OwnerRef>,
    ) -> Result<&DataPoint, DatapointRefError> {
        if let Some(id) = DataPointId::parse_reference(reference) {
            return self
                .datapoint(id)
                .ok_or_else(|| DatapointRefError::NotFound { reference: reference.to_string() });
        }

        let label = reference.trim();
        let plc_id = plc_name.and_then(|name| self.plc_by_name(name)).map(|p| p.id);
        let candidates: Vec<&DataPoint> = self
            .datapoints
            .iter()
            .filter(|dp| dp.label == label)
            .filter(|dp| owner.is_none_or(|o| dp.owner == o))
            .filter(|dp| plc_id.is_none_or(|p| self.plc_of_datapoint(dp.id) == Some(p)))
            .collect();

        match candidates.as_slice() {
            [] => Err(DatapointRefError::NotFound { reference: reference.to_string() }),
            [dp] => Ok(dp),
            many => Err(DatapointRefError::Ambiguous {
                reference: reference.to_string(),
                candidates: many
                    .iter()
                    .map(|dp| DatapointCandidate {
                        id: dp.id,
                        label: dp.label.clone(),
                        owner_type: dp.owner.to_string(),
                        owner_id: match dp.owner {
                            OwnerRef::Plc(id) => id.0,
                            OwnerRef::Container(id) => id.0,
                            OwnerRef::Equipment(id) => id.0,
                        },
                    })
                    .collect(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
