// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structural validation of the configuration tree, applied once at load.

use super::model::{
    Container, DataPoint, Equipment, OwnerRef, Plc, PointCategory, PointType,
};
use crate::access::{Grant, ResourceType};
use crate::alarm::AlarmRule;
use std::collections::HashSet;
use thiserror::Error;

/// Highest zero-based register offset addressable in one request.
const MAX_REGISTER_OFFSET: u64 = 65535;

/// A configuration tree that violates the data-model invariants.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("duplicate plc id {0}")]
    DuplicatePlcId(u32),
    #[error("duplicate plc name '{0}'")]
    DuplicatePlcName(String),
    #[error("plc '{name}' has an invalid host '{host}'")]
    InvalidHost { name: String, host: String },
    #[error("duplicate container id {0}")]
    DuplicateContainerId(u32),
    #[error("container '{name}' references unknown plc {plc_id}")]
    UnknownContainerPlc { name: String, plc_id: u32 },
    #[error("duplicate container name '{name}' under plc {plc_id}")]
    DuplicateContainerName { name: String, plc_id: u32 },
    #[error("duplicate equipment id {0}")]
    DuplicateEquipmentId(u32),
    #[error("equipment '{name}' references unknown container {container_id}")]
    UnknownEquipmentContainer { name: String, container_id: u32 },
    #[error("duplicate equipment name '{name}' under container {container_id}")]
    DuplicateEquipmentName { name: String, container_id: u32 },
    #[error("duplicate datapoint id {0}")]
    DuplicateDataPointId(u32),
    #[error("datapoint '{label}' references an unknown {owner} owner")]
    UnknownOwner { label: String, owner: String },
    #[error("duplicate datapoint label '{label}' under the same owner")]
    DuplicateLabel { label: String },
    #[error("datapoint '{label}' address {address} is not a usable 4xxxx holding register")]
    InvalidAddress { label: String, address: u32 },
    #[error("datapoint '{label}' is writable but has type REAL")]
    WritableReal { label: String },
    #[error("datapoint '{label}' bit {bit} is outside 0..=15")]
    BitOutOfRange { label: String, bit: u8 },
    #[error("datapoint '{label}' has duplicate bit {bit}")]
    DuplicateBit { label: String, bit: u8 },
    #[error("datapoint '{label}' has bit labels but is not DIGITAL")]
    BitsOnNonDigital { label: String },
    #[error("grant must name exactly one of role_id or user_id")]
    GrantPrincipal,
    #[error("duplicate grant for {principal} on {resource_type} {resource_id}")]
    DuplicateGrant { principal: String, resource_type: ResourceType, resource_id: u32 },
    #[error("grant references unknown {resource_type} {resource_id}")]
    UnknownGrantResource { resource_type: ResourceType, resource_id: u32 },
    #[error("duplicate rule id {0}")]
    DuplicateRuleId(u32),
    #[error("rule '{name}' references unknown datapoint {datapoint_id}")]
    UnknownRuleDatapoint { name: String, datapoint_id: u32 },
    #[error("rule '{name}' is invalid: {reason}")]
    InvalidRule { name: String, reason: String },
}

pub(super) fn validate(
    plcs: &[Plc],
    containers: &[Container],
    equipment: &[Equipment],
    datapoints: &[DataPoint],
    grants: &[Grant],
    rules: &[AlarmRule],
    real_extra_offset: u16,
) -> Result<(), ConfigError> {
    let mut plc_ids = HashSet::new();
    let mut plc_names = HashSet::new();
    for plc in plcs {
        if !plc_ids.insert(plc.id) {
            return Err(ConfigError::DuplicatePlcId(plc.id.0));
        }
        if !plc_names.insert(plc.name.as_str()) {
            return Err(ConfigError::DuplicatePlcName(plc.name.clone()));
        }
        if !host_is_valid(&plc.host) {
            return Err(ConfigError::InvalidHost {
                name: plc.name.clone(),
                host: plc.host.clone(),
            });
        }
    }

    let mut container_ids = HashSet::new();
    let mut container_names = HashSet::new();
    for container in containers {
        if !container_ids.insert(container.id) {
            return Err(ConfigError::DuplicateContainerId(container.id.0));
        }
        if !plc_ids.contains(&container.plc_id) {
            return Err(ConfigError::UnknownContainerPlc {
                name: container.name.clone(),
                plc_id: container.plc_id.0,
            });
        }
        if !container_names.insert((container.plc_id, container.name.as_str())) {
            return Err(ConfigError::DuplicateContainerName {
                name: container.name.clone(),
                plc_id: container.plc_id.0,
            });
        }
    }

    let mut equipment_ids = HashSet::new();
    let mut equipment_names = HashSet::new();
    for eq in equipment {
        if !equipment_ids.insert(eq.id) {
            return Err(ConfigError::DuplicateEquipmentId(eq.id.0));
        }
        if !container_ids.contains(&eq.container_id) {
            return Err(ConfigError::UnknownEquipmentContainer {
                name: eq.name.clone(),
                container_id: eq.container_id.0,
            });
        }
        if !equipment_names.insert((eq.container_id, eq.name.as_str())) {
            return Err(ConfigError::DuplicateEquipmentName {
                name: eq.name.clone(),
                container_id: eq.container_id.0,
            });
        }
    }

    let mut dp_ids = HashSet::new();
    let mut dp_labels = HashSet::new();
    for dp in datapoints {
        if !dp_ids.insert(dp.id) {
            return Err(ConfigError::DuplicateDataPointId(dp.id.0));
        }
        let owner_known = match dp.owner {
            OwnerRef::Plc(id) => plc_ids.contains(&id),
            OwnerRef::Container(id) => container_ids.contains(&id),
            OwnerRef::Equipment(id) => equipment_ids.contains(&id),
        };
        if !owner_known {
            return Err(ConfigError::UnknownOwner {
                label: dp.label.clone(),
                owner: dp.owner.to_string(),
            });
        }
        if !dp_labels.insert((dp.owner, dp.label.as_str())) {
            return Err(ConfigError::DuplicateLabel { label: dp.label.clone() });
        }
        // Every register the scan plan will touch must be addressable.
        // REAL reads start `real_extra_offset` past the base and occupy
        // two registers; everything else reads the base register alone.
        let offset = u64::from(dp.address).saturating_sub(40001);
        let last_register = match dp.point_type {
            PointType::Real => offset + u64::from(real_extra_offset) + 1,
            PointType::Integer | PointType::Digital => offset,
        };
        if dp.address < 40001 || last_register > MAX_REGISTER_OFFSET {
            return Err(ConfigError::InvalidAddress {
                label: dp.label.clone(),
                address: dp.address,
            });
        }
        if dp.category == PointCategory::Write && dp.point_type == PointType::Real {
            return Err(ConfigError::WritableReal { label: dp.label.clone() });
        }
        if dp.point_type != PointType::Digital && !dp.bits.is_empty() {
            return Err(ConfigError::BitsOnNonDigital { label: dp.label.clone() });
        }
        let mut seen_bits = HashSet::new();
        for bit in &dp.bits {
            if bit.bit > 15 {
                return Err(ConfigError::BitOutOfRange {
                    label: dp.label.clone(),
                    bit: bit.bit,
                });
            }
            if !seen_bits.insert(bit.bit) {
                return Err(ConfigError::DuplicateBit { label: dp.label.clone(), bit: bit.bit });
            }
        }
    }

    let mut grant_keys = HashSet::new();
    for grant in grants {
        let principal = match (grant.role_id, grant.user_id) {
            (Some(role), None) => format!("role:{role}"),
            (None, Some(user)) => format!("user:{user}"),
            _ => return Err(ConfigError::GrantPrincipal),
        };
        if !grant_keys.insert((principal.clone(), grant.resource_type, grant.resource_id)) {
            return Err(ConfigError::DuplicateGrant {
                principal,
                resource_type: grant.resource_type,
                resource_id: grant.resource_id,
            });
        }
        let known = match grant.resource_type {
            ResourceType::Plc => plc_ids.contains(&super::PlcId(grant.resource_id)),
            ResourceType::Container => container_ids.contains(&super::ContainerId(grant.resource_id)),
            ResourceType::Equipment => equipment_ids.contains(&super::EquipmentId(grant.resource_id)),
            ResourceType::Datapoint => dp_ids.contains(&super::DataPointId(grant.resource_id)),
        };
        if !known {
            return Err(ConfigError::UnknownGrantResource {
                resource_type: grant.resource_type,
                resource_id: grant.resource_id,
            });
        }
    }

    let mut rule_ids = HashSet::new();
    for rule in rules {
        if !rule_ids.insert(rule.id) {
            return Err(ConfigError::DuplicateRuleId(rule.id.0));
        }
        if !dp_ids.contains(&rule.datapoint_id) {
            return Err(ConfigError::UnknownRuleDatapoint {
                name: rule.name.clone(),
                datapoint_id: rule.datapoint_id.0,
            });
        }
        rule.validate().map_err(|reason| ConfigError::InvalidRule {
            name: rule.name.clone(),
            reason,
        })?;
    }

    Ok(())
}

fn host_is_valid(host: &str) -> bool {
    !host.is_empty() && !host.contains(char::is_whitespace) && !host.contains('/')
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
