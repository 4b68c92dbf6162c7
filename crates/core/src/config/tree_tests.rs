// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::{
    ContainerId, DataPointId, EquipmentId, OwnerRef, PlcId, PointCategory, PointType,
};
use crate::test_support::{
    fixture_containers, fixture_datapoints, fixture_equipment, fixture_plcs, fixture_tree,
};

#[test]
fn lookups_by_id_and_name() {
    let tree = fixture_tree();
    assert_eq!(tree.plc(PlcId(1)).unwrap().name, "P1");
    assert_eq!(tree.plc_by_name("P2").unwrap().id, PlcId(2));
    assert!(tree.plc_by_name("P3").is_none());
    assert_eq!(tree.container(ContainerId(2)).unwrap().name, "Engine Room");
    assert_eq!(tree.equipment(EquipmentId(4)).unwrap().name, "Compressor 1");
    assert_eq!(tree.datapoint(DataPointId(17)).unwrap().label, "START");
}

#[test]
fn datapoints_for_plc_walks_the_subtree_in_order() {
    let tree = fixture_tree();
    let labels: Vec<&str> =
        tree.datapoints_for_plc(PlcId(1)).iter().map(|dp| dp.label.as_str()).collect();
    // PLC-owned first, then container-owned, then equipment-owned.
    assert_eq!(labels, vec!["SETPOINT", "STATUS_WORD", "DISCHARGE_TEMP", "SUCTION_PRESSURE", "START"]);

    let p2: Vec<&str> =
        tree.datapoints_for_plc(PlcId(2)).iter().map(|dp| dp.label.as_str()).collect();
    assert_eq!(p2, vec!["LEVEL"]);
}

#[test]
fn plc_of_datapoint_resolves_through_every_owner_level() {
    let tree = fixture_tree();
    assert_eq!(tree.plc_of_datapoint(DataPointId(3)), Some(PlcId(1)));
    assert_eq!(tree.plc_of_datapoint(DataPointId(7)), Some(PlcId(1)));
    assert_eq!(tree.plc_of_datapoint(DataPointId(9)), Some(PlcId(1)));
    assert_eq!(tree.plc_of_datapoint(DataPointId(31)), Some(PlcId(2)));
    assert_eq!(tree.plc_of_datapoint(DataPointId(999)), None);
}

#[test]
fn owner_path_resolves_ancestry() {
    let tree = fixture_tree();
    let dp = tree.datapoint(DataPointId(9)).unwrap();
    let path = tree.owner_path(dp);
    assert_eq!(path.plc.unwrap().name, "P1");
    assert_eq!(path.container.unwrap().name, "Engine Room");
    assert_eq!(path.equipment.unwrap().name, "Compressor 1");

    let dp = tree.datapoint(DataPointId(3)).unwrap();
    let path = tree.owner_path(dp);
    assert_eq!(path.plc.unwrap().name, "P1");
    assert!(path.container.is_none());
    assert!(path.equipment.is_none());
}

#[test]
fn canonical_references_resolve() {
    let tree = fixture_tree();
    assert_eq!(tree.resolve_datapoint_ref("db-dp:17", None, None).unwrap().label, "START");
    assert_eq!(tree.resolve_datapoint_ref("17", None, None).unwrap().label, "START");
    assert_eq!(DataPointId(17).canonical_key(), "db-dp:17");
}

#[test]
fn unknown_references_fail() {
    let tree = fixture_tree();
    assert!(matches!(
        tree.resolve_datapoint_ref("db-dp:999", None, None),
        Err(DatapointRefError::NotFound { .. })
    ));
    assert!(matches!(
        tree.resolve_datapoint_ref("NO_SUCH_LABEL", Some("P1"), None),
        Err(DatapointRefError::NotFound { .. })
    ));
}

#[test]
fn label_lookups_are_scoped_by_plc() {
    let tree = fixture_tree();
    let dp = tree.resolve_datapoint_ref("START", Some("P1"), None).unwrap();
    assert_eq!(dp.id, DataPointId(17));
    // The label exists only under P1
    assert!(tree.resolve_datapoint_ref("START", Some("P2"), None).is_err());
}

#[test]
fn ambiguous_labels_fail_with_candidates() {
    // Same label on sibling owners is legal; resolving it unscoped is not.
    let mut datapoints = fixture_datapoints();
    let mut dup = datapoints[2].clone(); // DISCHARGE_TEMP on container 2
    dup.id = DataPointId(100);
    dup.owner = OwnerRef::Equipment(EquipmentId(4));
    datapoints.push(dup);

    let tree = ConfigTree::new(
        fixture_plcs(),
        fixture_containers(),
        fixture_equipment(),
        datapoints,
        vec![],
        vec![],
    )
    .unwrap();

    let err = tree.resolve_datapoint_ref("DISCHARGE_TEMP", Some("P1"), None).unwrap_err();
    match err {
        DatapointRefError::Ambiguous { candidates, .. } => {
            assert_eq!(candidates.len(), 2);
            let ids: Vec<u32> = candidates.iter().map(|c| c.id.0).collect();
            assert!(ids.contains(&7) && ids.contains(&100));
        }
        other => panic!("expected Ambiguous, got {other:?}"),
    }

    // Scoping by owner disambiguates.
    let dp = tree
        .resolve_datapoint_ref("DISCHARGE_TEMP", Some("P1"), Some(OwnerRef::Equipment(EquipmentId(4))))
        .unwrap();
    assert_eq!(dp.id, DataPointId(100));
}

#[test]
fn rules_for_skips_disabled_rules() {
    use crate::alarm::{AlarmRule, Comparison, RuleSource};
    use crate::config::RuleId;

    let enabled = AlarmRule {
        id: RuleId(1),
        datapoint_id: DataPointId(7),
        name: "hot".to_string(),
        source: RuleSource::Backend,
        external_id: None,
        enabled: true,
        severity: "critical".to_string(),
        comparison: Comparison::Above,
        warning_enabled: false,
        warning_threshold: None,
        alarm_threshold: Some(50.0),
        warning_low: None,
        warning_high: None,
        alarm_low: None,
        alarm_high: None,
        schedule: None,
    };
    let disabled = AlarmRule { id: RuleId(2), enabled: false, ..enabled.clone() };

    let tree = ConfigTree::new(
        fixture_plcs(),
        fixture_containers(),
        fixture_equipment(),
        fixture_datapoints(),
        vec![],
        vec![enabled, disabled],
    )
    .unwrap();

    let active: Vec<_> = tree.rules_for(DataPointId(7)).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, RuleId(1));
}

#[test]
fn datapoint_category_constraint_is_exposed() {
    let tree = fixture_tree();
    assert_eq!(tree.datapoint(DataPointId(9)).unwrap().category, PointCategory::Read);
    assert_eq!(tree.datapoint(DataPointId(17)).unwrap().point_type, PointType::Digital);
    assert_eq!(tree.datapoint(DataPointId(17)).unwrap().allowed_bits(), vec![0]);
    assert_eq!(tree.datapoint(DataPointId(17)).unwrap().bit_label(0), Some("Run"));
}
