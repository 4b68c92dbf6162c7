// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::access::{AccessLevel, Grant, ResourceType};
use crate::config::{
    ConfigError, ConfigTree, DataPointBit, DataPointId, PointCategory, PointType, RoleId, UserId,
};
use crate::test_support::{
    fixture_containers, fixture_datapoints, fixture_equipment, fixture_plcs,
};

fn build(
    mutate: impl FnOnce(
        &mut Vec<crate::config::Plc>,
        &mut Vec<crate::config::DataPoint>,
        &mut Vec<Grant>,
    ),
) -> Result<ConfigTree, ConfigError> {
    let mut plcs = fixture_plcs();
    let mut datapoints = fixture_datapoints();
    let mut grants = Vec::new();
    mutate(&mut plcs, &mut datapoints, &mut grants);
    ConfigTree::new(
        plcs,
        fixture_containers(),
        fixture_equipment(),
        datapoints,
        grants,
        vec![],
    )
}

#[test]
fn fixture_tree_is_valid() {
    assert!(build(|_, _, _| {}).is_ok());
}

#[test]
fn duplicate_plc_name_is_rejected() {
    let err = build(|plcs, _, _| plcs[1].name = "P1".to_string()).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicatePlcName(name) if name == "P1"));
}

#[test]
fn invalid_host_is_rejected() {
    let err = build(|plcs, _, _| plcs[0].host = "not a host".to_string()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidHost { .. }));
}

#[test]
fn writable_real_is_rejected() {
    let err = build(|_, dps, _| {
        // SUCTION_PRESSURE is REAL; REAL datapoints are never writable
        let dp = dps.iter_mut().find(|d| d.id == DataPointId(9)).unwrap();
        dp.category = PointCategory::Write;
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::WritableReal { label } if label == "SUCTION_PRESSURE"));
}

#[test]
fn bit_labels_on_non_digital_are_rejected() {
    let err = build(|_, dps, _| {
        let dp = dps.iter_mut().find(|d| d.id == DataPointId(7)).unwrap();
        dp.bits.push(DataPointBit { bit: 0, label: "Run".to_string() });
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::BitsOnNonDigital { .. }));
}

#[test]
fn bit_out_of_range_is_rejected() {
    let err = build(|_, dps, _| {
        let dp = dps.iter_mut().find(|d| d.id == DataPointId(17)).unwrap();
        dp.bits.push(DataPointBit { bit: 16, label: "Overflow".to_string() });
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::BitOutOfRange { bit: 16, .. }));
}

#[test]
fn duplicate_bit_is_rejected() {
    let err = build(|_, dps, _| {
        let dp = dps.iter_mut().find(|d| d.id == DataPointId(17)).unwrap();
        dp.bits.push(DataPointBit { bit: 0, label: "Again".to_string() });
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateBit { bit: 0, .. }));
}

#[test]
fn duplicate_label_under_one_owner_is_rejected() {
    let err = build(|_, dps, _| {
        let mut dup = dps[0].clone();
        dup.id = DataPointId(999);
        dps.push(dup);
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateLabel { .. }));
}

#[test]
fn non_holding_register_address_is_rejected() {
    let err = build(|_, dps, _| dps[0].address = 30001).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidAddress { address: 30001, .. }));
}

#[test]
fn one_register_points_may_use_the_top_offset() {
    // SETPOINT is INTEGER: a single register, so offset 65535
    // (address 105536) is addressable
    assert!(build(|_, dps, _| dps[0].address = 105536).is_ok());

    let err = build(|_, dps, _| dps[0].address = 105537).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidAddress { address: 105537, .. }));
}

#[test]
fn real_points_need_headroom_for_the_extra_offset() {
    // With the default extra offset of 1, a REAL at offset 65533 reads
    // registers 65534..=65535 and still fits
    assert!(build(|_, dps, _| {
        let dp = dps.iter_mut().find(|d| d.id == DataPointId(9)).unwrap();
        dp.address = 105534;
    })
    .is_ok());

    // One address further and the low word falls off the register space
    let err = build(|_, dps, _| {
        let dp = dps.iter_mut().find(|d| d.id == DataPointId(9)).unwrap();
        dp.address = 105535;
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidAddress { address: 105535, .. }));
}

#[test]
fn real_bound_follows_the_configured_extra_offset() {
    let mut datapoints = fixture_datapoints();
    let dp = datapoints.iter_mut().find(|d| d.id == DataPointId(9)).unwrap();
    // Valid for the default offset of 1...
    dp.address = 105534;

    // ...but a deployment running with extra offset 2 would read past
    // the end of the register space; validation rejects it up front
    // instead of letting the scan planner drop the tag at runtime.
    let err = ConfigTree::with_real_extra_offset(
        fixture_plcs(),
        fixture_containers(),
        fixture_equipment(),
        datapoints.clone(),
        vec![],
        vec![],
        2,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidAddress { address: 105534, .. }));

    // Offset-0 deployments get one register more of headroom
    let dp = datapoints.iter_mut().find(|d| d.id == DataPointId(9)).unwrap();
    dp.address = 105535;
    assert!(ConfigTree::with_real_extra_offset(
        fixture_plcs(),
        fixture_containers(),
        fixture_equipment(),
        datapoints,
        vec![],
        vec![],
        0,
    )
    .is_ok());
}

#[test]
fn grant_with_both_principals_is_rejected() {
    let err = build(|_, _, grants| {
        grants.push(Grant {
            role_id: Some(RoleId(1)),
            user_id: Some(UserId(1)),
            resource_type: ResourceType::Plc,
            resource_id: 1,
            access_level: AccessLevel::Read,
            include_descendants: true,
        });
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::GrantPrincipal));
}

#[test]
fn duplicate_grant_is_rejected() {
    let err = build(|_, _, grants| {
        let grant = Grant {
            role_id: None,
            user_id: Some(UserId(1)),
            resource_type: ResourceType::Datapoint,
            resource_id: 9,
            access_level: AccessLevel::Read,
            include_descendants: false,
        };
        grants.push(grant.clone());
        grants.push(Grant { access_level: AccessLevel::Write, ..grant });
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateGrant { .. }));
}

#[test]
fn grant_on_unknown_resource_is_rejected() {
    let err = build(|_, _, grants| {
        grants.push(Grant {
            role_id: Some(RoleId(1)),
            user_id: None,
            resource_type: ResourceType::Equipment,
            resource_id: 999,
            access_level: AccessLevel::Read,
            include_descendants: true,
        });
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownGrantResource { resource_id: 999, .. }));
}

#[test]
fn rule_on_unknown_datapoint_is_rejected() {
    use crate::alarm::{AlarmRule, Comparison, RuleSource};
    use crate::config::RuleId;

    let err = ConfigTree::new(
        fixture_plcs(),
        fixture_containers(),
        fixture_equipment(),
        fixture_datapoints(),
        vec![],
        vec![AlarmRule {
            id: RuleId(1),
            datapoint_id: DataPointId(12345),
            name: "orphan".to_string(),
            source: RuleSource::Backend,
            external_id: None,
            enabled: true,
            severity: "info".to_string(),
            comparison: Comparison::Above,
            warning_enabled: false,
            warning_threshold: None,
            alarm_threshold: Some(1.0),
            warning_low: None,
            warning_high: None,
            alarm_low: None,
            alarm_high: None,
            schedule: None,
        }],
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownRuleDatapoint { .. }));
}
