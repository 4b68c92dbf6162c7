// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sg-core: domain model for the SCADA gateway core.
//!
//! Pure types and logic shared by every other crate: the configuration
//! tree, scan planning and register decoding, command and alarm records,
//! access grants and effective-access computation, and the WAL event enum.

pub mod macros;

pub mod access;
pub mod alarm;
pub mod clock;
pub mod command;
pub mod config;
pub mod event;
pub mod id;
pub mod point;
pub mod scan;
pub mod snapshot;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use access::{AccessLevel, EffectiveAccess, Grant, Principal, PrincipalKind, ResourceType};
pub use alarm::{
    make_stable_key, AlarmEventRecord, AlarmOccurrence, AlarmRule, AlarmSource, AlarmState,
    Comparison, Evaluation, RuleSource, Schedule,
};
pub use clock::{Clock, FakeClock, SystemClock};
pub use command::{Command, CommandEvent, CommandId, CommandKind, CommandPayload, CommandStatus};
pub use config::{
    ConfigError, ConfigTree, Container, ContainerId, DataPoint, DataPointBit, DataPointId,
    DatapointRefError, Equipment, EquipmentId, OwnerRef, Plc, PlcId, PointCategory, PointType,
    RoleId, RuleId, ScaleRange, UserId,
};
pub use event::Event;
pub use point::{BitReading, PointReading, PointValue};
pub use scan::{register_offset, Block, ScanPlan, TagSpec};
pub use snapshot::{ContainerSnapshot, EquipmentSnapshot, PlcSnapshot};
