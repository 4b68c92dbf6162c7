// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration tree: PLCs, containers, equipment, datapoints, and the
//! grants and alarm rules attached to them.
//!
//! The tree is loaded once at startup, validated, and indexed; it is
//! immutable for the lifetime of the process (admin CRUD lives outside the
//! core). Every id is stable and comes from the stored configuration.

mod model;
mod tree;
mod validate;

pub use model::{
    Container, ContainerId, DataPoint, DataPointBit, DataPointId, Equipment, EquipmentId,
    OwnerRef, Plc, PlcId, PointCategory, PointType, RoleId, RuleId, ScaleRange, UserId,
};
pub use tree::{ConfigTree, DatapointRefError, OwnerPath};
pub use validate::ConfigError;
