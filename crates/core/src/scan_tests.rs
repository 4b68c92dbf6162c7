// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::{DataPoint, DataPointId, OwnerRef, PlcId, PointCategory};
use crate::test_support::fixture_tree;
use proptest::prelude::*;

fn dp(id: u32, address: u32, point_type: PointType) -> DataPoint {
    DataPoint {
        id: DataPointId(id),
        owner: OwnerRef::Plc(PlcId(1)),
        label: format!("TAG_{id}"),
        description: None,
        category: PointCategory::Read,
        point_type,
        address,
        multiplier: 1.0,
        scale: None,
        group: None,
        class: None,
        unit: None,
        bits: vec![],
    }
}

#[test]
fn register_offset_follows_4xxxx_convention() {
    assert_eq!(register_offset(40001), Some(0));
    assert_eq!(register_offset(40050), Some(49));
    assert_eq!(register_offset(40000), None);
    assert_eq!(register_offset(39999), None);
}

#[test]
fn real_tags_read_one_past_base() {
    let points = [dp(1, 40101, PointType::Real)];
    let tags = build_tag_specs(&points, DEFAULT_REAL_EXTRA_OFFSET);
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].base_offset, 100);
    assert_eq!(tags[0].read_offset, 101);
    assert_eq!(tags[0].length, 2);
}

#[test]
fn real_extra_offset_zero_disables_the_quirk() {
    let points = [dp(1, 40101, PointType::Real)];
    let tags = build_tag_specs(&points, 0);
    assert_eq!(tags[0].read_offset, 100);
}

#[test]
fn integer_and_digital_occupy_one_register() {
    let points = [dp(1, 40010, PointType::Integer), dp(2, 40011, PointType::Digital)];
    let tags = build_tag_specs(&points, DEFAULT_REAL_EXTRA_OFFSET);
    assert!(tags.iter().all(|t| t.length == 1));
    assert!(tags.iter().all(|t| t.read_offset == t.base_offset));
}

#[test]
fn tags_sort_by_read_offset() {
    let points = [dp(1, 40050, PointType::Integer), dp(2, 40010, PointType::Integer)];
    let tags = build_tag_specs(&points, DEFAULT_REAL_EXTRA_OFFSET);
    assert_eq!(tags[0].datapoint_id, DataPointId(2));
    assert_eq!(tags[1].datapoint_id, DataPointId(1));
}

#[test]
fn adjacent_tags_merge_into_one_block() {
    let points = [
        dp(1, 40001, PointType::Integer),
        dp(2, 40002, PointType::Integer),
        dp(3, 40003, PointType::Integer),
    ];
    let tags = build_tag_specs(&points, DEFAULT_REAL_EXTRA_OFFSET);
    let blocks = build_blocks(&tags, MAX_BLOCK_REGS, MAX_GAP_REGS);
    assert_eq!(blocks, vec![Block { start: 0, count: 3 }]);
}

#[test]
fn gap_at_limit_merges_but_one_past_splits() {
    // Gap of exactly MAX_GAP_REGS registers merges
    let points = [dp(1, 40001, PointType::Integer), dp(2, 40004, PointType::Integer)];
    let tags = build_tag_specs(&points, DEFAULT_REAL_EXTRA_OFFSET);
    let blocks = build_blocks(&tags, MAX_BLOCK_REGS, MAX_GAP_REGS);
    assert_eq!(blocks, vec![Block { start: 0, count: 4 }]);

    // One register further splits
    let points = [dp(1, 40001, PointType::Integer), dp(2, 40005, PointType::Integer)];
    let tags = build_tag_specs(&points, DEFAULT_REAL_EXTRA_OFFSET);
    let blocks = build_blocks(&tags, MAX_BLOCK_REGS, MAX_GAP_REGS);
    assert_eq!(blocks, vec![Block { start: 0, count: 1 }, Block { start: 4, count: 1 }]);
}

#[test]
fn block_size_limit_forces_split() {
    let points = [dp(1, 40001, PointType::Integer), dp(2, 40100, PointType::Integer)];
    let tags = build_tag_specs(&points, DEFAULT_REAL_EXTRA_OFFSET);
    // Merging would need a 100-register block; cap at 99 forces a split.
    let blocks = build_blocks(&tags, 99, 100);
    assert_eq!(blocks.len(), 2);
}

#[test]
fn empty_tag_list_builds_no_blocks() {
    assert!(build_blocks(&[], MAX_BLOCK_REGS, MAX_GAP_REGS).is_empty());
}

#[test]
fn plan_for_fixture_plc_covers_every_tag() {
    let tree = fixture_tree();
    let plan = ScanPlan::for_plc(&tree, PlcId(1));
    // P1 owns five datapoints across plc/container/equipment levels.
    assert_eq!(plan.tags.len(), 5);
    for tag in &plan.tags {
        let covered = plan.blocks.iter().any(|b| {
            tag.read_offset >= b.start && tag.read_offset + tag.length - 1 < b.start + b.count
        });
        assert!(covered, "tag {} not covered by any block", tag.label);
    }
}

proptest! {
    /// Every tag is covered by exactly one block, blocks are sorted,
    /// disjoint, and no larger than the configured cap (or the largest
    /// single tag when one tag alone exceeds it).
    #[test]
    fn blocks_cover_all_tags(addresses in proptest::collection::vec(40001u32..41000, 1..40)) {
        let points: Vec<DataPoint> = addresses
            .iter()
            .enumerate()
            .map(|(i, &addr)| dp(i as u32 + 1, addr, PointType::Integer))
            .collect();
        let tags = build_tag_specs(&points, DEFAULT_REAL_EXTRA_OFFSET);
        let blocks = build_blocks(&tags, MAX_BLOCK_REGS, MAX_GAP_REGS);

        for tag in &tags {
            let covering = blocks
                .iter()
                .filter(|b| tag.read_offset >= b.start
                    && tag.read_offset + tag.length - 1 < b.start + b.count)
                .count();
            prop_assert_eq!(covering, 1);
        }
        for pair in blocks.windows(2) {
            prop_assert!(pair[0].start + pair[0].count <= pair[1].start);
        }
        for block in &blocks {
            prop_assert!(block.count <= MAX_BLOCK_REGS);
        }
    }
}
