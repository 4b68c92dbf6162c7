// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration record types.

use serde::{Deserialize, Serialize};

crate::num_id! {
    /// Id of a PLC endpoint.
    pub struct PlcId;
}

crate::num_id! {
    /// Id of a container (a room, line, or plant section under a PLC).
    pub struct ContainerId;
}

crate::num_id! {
    /// Id of a piece of equipment under a container.
    pub struct EquipmentId;
}

crate::num_id! {
    /// Id of a datapoint (a tag bound to a holding register).
    pub struct DataPointId;
}

crate::num_id! {
    /// Id of a role, assigned by the external auth layer.
    pub struct RoleId;
}

crate::num_id! {
    /// Id of a user, assigned by the external auth layer.
    pub struct UserId;
}

crate::num_id! {
    /// Id of an alarm rule.
    pub struct RuleId;
}

/// A Modbus/TCP endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plc {
    pub id: PlcId,
    pub name: String,
    pub host: String,
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    /// Modbus unit (slave) id.
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    /// Disabled PLCs are configured but not polled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

/// A grouping level under a PLC (e.g. an engine room or a processing line).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub plc_id: PlcId,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// A piece of equipment under a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: EquipmentId,
    pub container_id: ContainerId,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// The node a datapoint hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OwnerRef {
    Plc(PlcId),
    Container(ContainerId),
    Equipment(EquipmentId),
}

crate::simple_display! {
    OwnerRef {
        Plc(..) => "plc",
        Container(..) => "container",
        Equipment(..) => "equipment",
    }
}

/// Value shape of a datapoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PointType {
    Integer,
    Digital,
    Real,
}

crate::simple_display! {
    PointType {
        Integer => "INTEGER",
        Digital => "DIGITAL",
        Real => "REAL",
    }
}

/// Whether a datapoint is polled only, or may also be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointCategory {
    Read,
    Write,
}

crate::simple_display! {
    PointCategory {
        Read => "read",
        Write => "write",
    }
}

/// Linear rescale applied to decoded REAL values when fully configured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleRange {
    pub raw_zero: f64,
    pub raw_full: f64,
    pub eng_zero: f64,
    pub eng_full: f64,
}

/// A labeled bit inside a DIGITAL datapoint's register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPointBit {
    pub bit: u8,
    pub label: String,
}

/// A named tag bound to a holding register (or register pair for REAL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub id: DataPointId,
    pub owner: OwnerRef,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: PointCategory,
    #[serde(rename = "type")]
    pub point_type: PointType,
    /// Holding-register reference in 4xxxx form.
    pub address: u32,
    /// Scaling multiplier for REAL values.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<ScaleRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Bit labels; only meaningful when `point_type` is DIGITAL.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bits: Vec<DataPointBit>,
}

fn default_multiplier() -> f64 {
    1.0
}

impl DataPoint {
    /// Bit numbers allowed for DIGITAL writes, if any labels are configured.
    pub fn allowed_bits(&self) -> Vec<u8> {
        let mut bits: Vec<u8> = self.bits.iter().map(|b| b.bit).collect();
        bits.sort_unstable();
        bits
    }

    /// Label for a bit, when one is configured.
    pub fn bit_label(&self, bit: u8) -> Option<&str> {
        self.bits.iter().find(|b| b.bit == bit).map(|b| b.label.as_str())
    }
}
