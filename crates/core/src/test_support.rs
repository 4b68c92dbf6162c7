// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for tests across the workspace.

use crate::access::Grant;
use crate::alarm::AlarmRule;
use crate::config::{
    ConfigTree, Container, ContainerId, DataPoint, DataPointBit, DataPointId, Equipment,
    EquipmentId, OwnerRef, Plc, PlcId, PointCategory, PointType,
};

/// A small two-PLC plant used throughout the test suites.
///
/// ```text
/// P1 (id 1, host 127.0.0.1)
/// ├── SETPOINT        dp 3,  INTEGER write, 40020
/// ├── STATUS_WORD     dp 21, DIGITAL read,  40060, bits {0: Run, 1: Fault}
/// └── Engine Room (container 2)
///     ├── DISCHARGE_TEMP dp 7, INTEGER read, 40010
///     └── Compressor 1 (equipment 4)
///         ├── SUCTION_PRESSURE dp 9,  REAL read,     40101
///         └── START            dp 17, DIGITAL write, 40050, bits {0: Run}
/// P2 (id 2, host 127.0.0.2)
/// └── LEVEL dp 31, INTEGER write, 40005
/// ```
pub fn fixture_tree() -> ConfigTree {
    fixture_tree_with(Vec::new(), Vec::new())
}

/// The fixture plant with caller-supplied grants and alarm rules.
#[allow(clippy::unwrap_used)]
pub fn fixture_tree_with(grants: Vec<Grant>, rules: Vec<AlarmRule>) -> ConfigTree {
    ConfigTree::new(
        fixture_plcs(),
        fixture_containers(),
        fixture_equipment(),
        fixture_datapoints(),
        grants,
        rules,
    )
    .unwrap()
}

pub fn fixture_plcs() -> Vec<Plc> {
    vec![
        Plc {
            id: PlcId(1),
            name: "P1".to_string(),
            host: "127.0.0.1".to_string(),
            port: 502,
            unit_id: 1,
            enabled: true,
        },
        Plc {
            id: PlcId(2),
            name: "P2".to_string(),
            host: "127.0.0.2".to_string(),
            port: 502,
            unit_id: 1,
            enabled: true,
        },
    ]
}

pub fn fixture_containers() -> Vec<Container> {
    vec![Container {
        id: ContainerId(2),
        plc_id: PlcId(1),
        name: "Engine Room".to_string(),
        kind: Some("room".to_string()),
    }]
}

pub fn fixture_equipment() -> Vec<Equipment> {
    vec![Equipment {
        id: EquipmentId(4),
        container_id: ContainerId(2),
        name: "Compressor 1".to_string(),
        kind: Some("screw_comp".to_string()),
    }]
}

pub fn fixture_datapoints() -> Vec<DataPoint> {
    vec![
        datapoint(3, OwnerRef::Plc(PlcId(1)), "SETPOINT", PointType::Integer, PointCategory::Write, 40020, vec![]),
        datapoint(
            21,
            OwnerRef::Plc(PlcId(1)),
            "STATUS_WORD",
            PointType::Digital,
            PointCategory::Read,
            40060,
            vec![bit(0, "Run"), bit(1, "Fault")],
        ),
        datapoint(
            7,
            OwnerRef::Container(ContainerId(2)),
            "DISCHARGE_TEMP",
            PointType::Integer,
            PointCategory::Read,
            40010,
            vec![],
        ),
        datapoint(
            9,
            OwnerRef::Equipment(EquipmentId(4)),
            "SUCTION_PRESSURE",
            PointType::Real,
            PointCategory::Read,
            40101,
            vec![],
        ),
        datapoint(
            17,
            OwnerRef::Equipment(EquipmentId(4)),
            "START",
            PointType::Digital,
            PointCategory::Write,
            40050,
            vec![bit(0, "Run")],
        ),
        datapoint(31, OwnerRef::Plc(PlcId(2)), "LEVEL", PointType::Integer, PointCategory::Write, 40005, vec![]),
    ]
}

fn bit(bit: u8, label: &str) -> DataPointBit {
    DataPointBit { bit, label: label.to_string() }
}

fn datapoint(
    id: u32,
    owner: OwnerRef,
    label: &str,
    point_type: PointType,
    category: PointCategory,
    address: u32,
    bits: Vec<DataPointBit>,
) -> DataPoint {
    DataPoint {
        id: DataPointId(id),
        owner,
        label: label.to_string(),
        description: None,
        category,
        point_type,
        address,
        multiplier: 1.0,
        scale: None,
        group: None,
        class: None,
        unit: None,
        bits,
    }
}
