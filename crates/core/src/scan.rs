// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scan planning: flatten a PLC's datapoints into tag specs and group
//! contiguous tags into bounded read blocks.
//!
//! The number of Modbus reads per polling cycle is the number of blocks,
//! so adjacent tags are merged as long as the register gap and the block
//! size stay within limits.

use crate::config::{ConfigTree, DataPoint, DataPointId, PlcId, PointType};

/// Block building defaults (tuning constants).
pub const MAX_BLOCK_REGS: u16 = 100;
pub const MAX_GAP_REGS: u16 = 2;

/// Extra register offset applied to REAL reads.
///
/// The legacy decoder reads REAL at `base + 1`, treating the configured
/// address as the register before the high word. Deployed PLC programs
/// depend on this; set to 0 only for deployments without the quirk.
pub const DEFAULT_REAL_EXTRA_OFFSET: u16 = 1;

/// Convert a 4xxxx holding-register reference to its zero-based offset.
pub fn register_offset(address_4x: u32) -> Option<u16> {
    let offset = address_4x.checked_sub(40001)?;
    u16::try_from(offset).ok()
}

/// A leaf tag flattened with its addressing, ready to decode.
#[derive(Debug, Clone, PartialEq)]
pub struct TagSpec {
    pub datapoint_id: DataPointId,
    pub label: String,
    pub point_type: PointType,
    /// Configured 4xxxx reference.
    pub configured_4x: u32,
    /// Zero-based offset of the configured reference.
    pub base_offset: u16,
    /// Offset actually read (includes the REAL extra offset).
    pub read_offset: u16,
    /// Registers occupied: 2 for REAL, 1 otherwise.
    pub length: u16,
}

impl TagSpec {
    fn from_datapoint(dp: &DataPoint, real_extra_offset: u16) -> Option<Self> {
        let base_offset = register_offset(dp.address)?;
        let (read_offset, length) = match dp.point_type {
            PointType::Real => (base_offset.checked_add(real_extra_offset)?, 2),
            PointType::Integer | PointType::Digital => (base_offset, 1),
        };
        // The last register of the tag must still be addressable.
        read_offset.checked_add(length - 1)?;
        Some(Self {
            datapoint_id: dp.id,
            label: dp.label.clone(),
            point_type: dp.point_type,
            configured_4x: dp.address,
            base_offset,
            read_offset,
            length,
        })
    }
}

/// A contiguous register range to read in one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub start: u16,
    pub count: u16,
}

/// The ordered tag list and block plan for one PLC.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanPlan {
    pub tags: Vec<TagSpec>,
    pub blocks: Vec<Block>,
}

impl ScanPlan {
    /// Build the plan for every datapoint owned by `plc` and its
    /// descendants, using the REAL extra offset the tree was validated
    /// against.
    pub fn for_plc(tree: &ConfigTree, plc: PlcId) -> Self {
        let tags = build_tag_specs(tree.datapoints_for_plc(plc), tree.real_extra_offset());
        let blocks = build_blocks(&tags, MAX_BLOCK_REGS, MAX_GAP_REGS);
        Self { tags, blocks }
    }
}

/// Flatten datapoints into sorted tag specs.
///
/// Sorted by `(read_offset, length, label)` for deterministic block
/// building. Datapoints whose registers cannot all be addressed are
/// skipped; configuration validation rejects such addresses for the
/// offset the tree carries, so a skip here means the caller paired a
/// tree with a foreign offset (the poller reports any such drop).
pub fn build_tag_specs<'a>(
    datapoints: impl IntoIterator<Item = &'a DataPoint>,
    real_extra_offset: u16,
) -> Vec<TagSpec> {
    let mut tags: Vec<TagSpec> = datapoints
        .into_iter()
        .filter_map(|dp| TagSpec::from_datapoint(dp, real_extra_offset))
        .collect();
    tags.sort_by(|a, b| {
        (a.read_offset, a.length, &a.label).cmp(&(b.read_offset, b.length, &b.label))
    });
    tags
}

/// Group sorted tags into contiguous read blocks.
///
/// A block is extended while the register gap to the next tag is at most
/// `max_gap_regs` and the resulting size stays within `max_block_regs`.
pub fn build_blocks(tags: &[TagSpec], max_block_regs: u16, max_gap_regs: u16) -> Vec<Block> {
    let Some(first) = tags.first() else {
        return Vec::new();
    };

    let mut blocks = Vec::new();
    let mut block_start = first.read_offset;
    let mut block_end = first.read_offset + first.length - 1;

    for tag in &tags[1..] {
        let tag_start = tag.read_offset;
        let tag_end = tag.read_offset + tag.length - 1;

        // Overlapping or adjacent tags have no gap.
        let gap = u32::from(tag_start).saturating_sub(u32::from(block_end) + 1);
        let new_end = block_end.max(tag_end);
        let new_size = u32::from(new_end) - u32::from(block_start) + 1;

        if gap <= u32::from(max_gap_regs) && new_size <= u32::from(max_block_regs) {
            block_end = new_end;
        } else {
            blocks.push(Block { start: block_start, count: block_end - block_start + 1 });
            block_start = tag_start;
            block_end = tag_end;
        }
    }

    blocks.push(Block { start: block_start, count: block_end - block_start + 1 });
    blocks
}

#[cfg(test)]
#[path = "scan_tests.rs"]
mod tests;
