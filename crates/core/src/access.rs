// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access grants and effective-access computation.
//!
//! Allow-only RBAC over the configuration tree: grants attach to a role or
//! a user, target one tree node, and optionally include its descendants.
//! `write` implies `read`, and readable leaves escalate read access to
//! their ancestors so a principal can always navigate to what it can see.

use crate::config::{
    ConfigTree, ContainerId, DataPointId, EquipmentId, OwnerRef, PlcId, RoleId, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Permission strings that skip per-resource filtering entirely.
const ADMIN_PERMISSIONS: [&str; 2] = ["users:admin", "roles:admin"];

/// Level of a configuration-tree node a grant can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Plc,
    Container,
    Equipment,
    Datapoint,
}

crate::simple_display! {
    ResourceType {
        Plc => "plc",
        Container => "container",
        Equipment => "equipment",
        Datapoint => "datapoint",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
}

crate::simple_display! {
    AccessLevel {
        Read => "read",
        Write => "write",
    }
}

/// One access grant. Exactly one of `role_id` / `user_id` is set
/// (validated at configuration load).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<RoleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub resource_type: ResourceType,
    pub resource_id: u32,
    pub access_level: AccessLevel,
    #[serde(default = "default_include_descendants")]
    pub include_descendants: bool,
}

fn default_include_descendants() -> bool {
    true
}

/// What kind of principal a request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalKind {
    /// A human user; user-specific grants apply in addition to role grants.
    User { user_id: UserId },
    /// A service client bound to roles only.
    App,
}

/// The identity the external auth layer extracted from a verified token.
/// The core trusts its contents.
#[derive(Debug, Clone)]
pub struct Principal {
    pub kind: PrincipalKind,
    pub subject: String,
    pub username: Option<String>,
    pub role_ids: Vec<RoleId>,
    pub permissions: HashSet<String>,
}

impl Principal {
    pub fn user(user_id: u32, username: impl Into<String>, role_ids: Vec<RoleId>) -> Self {
        Self {
            kind: PrincipalKind::User { user_id: UserId(user_id) },
            subject: user_id.to_string(),
            username: Some(username.into()),
            role_ids,
            permissions: HashSet::new(),
        }
    }

    pub fn app(subject: impl Into<String>, role_ids: Vec<RoleId>) -> Self {
        Self {
            kind: PrincipalKind::App,
            subject: subject.into(),
            username: None,
            role_ids,
            permissions: HashSet::new(),
        }
    }

    pub fn with_permissions<I, S>(mut self, perms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = perms.into_iter().map(Into::into).collect();
        self
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self.kind {
            PrincipalKind::User { user_id } => Some(user_id),
            PrincipalKind::App => None,
        }
    }

    /// Admin bypass: `users:admin` or `roles:admin` skips resource filtering.
    pub fn is_admin(&self) -> bool {
        ADMIN_PERMISSIONS.iter().any(|p| self.permissions.contains(*p))
    }
}

/// Computed access sets for a principal.
///
/// `write` implies `read`; read sets are closed upward over the tree for
/// navigation. Computed lazily per request, O(1) lookups afterwards.
#[derive(Debug, Clone, Default)]
pub struct EffectiveAccess {
    admin: bool,

    pub read_plc_ids: HashSet<PlcId>,
    pub write_plc_ids: HashSet<PlcId>,

    pub read_container_ids: HashSet<ContainerId>,
    pub write_container_ids: HashSet<ContainerId>,

    pub read_equipment_ids: HashSet<EquipmentId>,
    pub write_equipment_ids: HashSet<EquipmentId>,

    pub read_datapoint_ids: HashSet<DataPointId>,
    pub write_datapoint_ids: HashSet<DataPointId>,
}

impl EffectiveAccess {
    /// Access with the admin bypass: every check passes.
    pub fn admin() -> Self {
        Self { admin: true, ..Self::default() }
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Compute effective access for a principal.
    ///
    /// Users get role grants ∪ user grants; app clients get role grants
    /// only. Principals holding an admin permission skip filtering.
    pub fn for_principal(tree: &ConfigTree, principal: &Principal) -> Self {
        if principal.is_admin() {
            return Self::admin();
        }
        let user_id = principal.user_id();
        let grants = tree.grants().iter().filter(|g| {
            g.user_id.is_some_and(|u| Some(u) == user_id)
                || g.role_id.is_some_and(|r| principal.role_ids.contains(&r))
        });
        Self::from_grants(tree, grants)
    }

    /// Compute effective access from a pre-filtered set of grants.
    pub fn from_grants<'a>(
        tree: &ConfigTree,
        grants: impl IntoIterator<Item = &'a Grant>,
    ) -> Self {
        let mut acc = Self::default();

        for grant in grants {
            let write = grant.access_level == AccessLevel::Write;
            let id = grant.resource_id;

            match grant.resource_type {
                ResourceType::Plc => {
                    acc.add_plc(PlcId(id), write);
                    if grant.include_descendants {
                        acc.add_plc_descendants(tree, PlcId(id), write);
                    }
                }
                ResourceType::Container => {
                    acc.add_container(ContainerId(id), write);
                    if grant.include_descendants {
                        acc.add_container_descendants(tree, ContainerId(id), write);
                    }
                }
                ResourceType::Equipment => {
                    acc.add_equipment(EquipmentId(id), write);
                    if grant.include_descendants {
                        for dp in tree.datapoints_of(OwnerRef::Equipment(EquipmentId(id))) {
                            acc.add_datapoint(dp, write);
                        }
                    }
                }
                ResourceType::Datapoint => acc.add_datapoint(DataPointId(id), write),
            }
        }

        acc.escalate_ancestors(tree);
        acc
    }

    fn add_plc(&mut self, id: PlcId, write: bool) {
        self.read_plc_ids.insert(id);
        if write {
            self.write_plc_ids.insert(id);
        }
    }

    fn add_container(&mut self, id: ContainerId, write: bool) {
        self.read_container_ids.insert(id);
        if write {
            self.write_container_ids.insert(id);
        }
    }

    fn add_equipment(&mut self, id: EquipmentId, write: bool) {
        self.read_equipment_ids.insert(id);
        if write {
            self.write_equipment_ids.insert(id);
        }
    }

    fn add_datapoint(&mut self, id: DataPointId, write: bool) {
        self.read_datapoint_ids.insert(id);
        if write {
            self.write_datapoint_ids.insert(id);
        }
    }

    fn add_plc_descendants(&mut self, tree: &ConfigTree, plc: PlcId, write: bool) {
        for dp in tree.datapoints_of(OwnerRef::Plc(plc)) {
            self.add_datapoint(dp, write);
        }
        for container in tree.containers_of_plc(plc) {
            self.add_container(container, write);
            self.add_container_descendants(tree, container, write);
        }
    }

    fn add_container_descendants(&mut self, tree: &ConfigTree, container: ContainerId, write: bool) {
        for dp in tree.datapoints_of(OwnerRef::Container(container)) {
            self.add_datapoint(dp, write);
        }
        for equipment in tree.equipment_of_container(container) {
            self.add_equipment(equipment, write);
            for dp in tree.datapoints_of(OwnerRef::Equipment(equipment)) {
                self.add_datapoint(dp, write);
            }
        }
    }

    /// Close the read sets upward so every readable node's ancestors are
    /// readable too. Edges only point upward, so one ordered pass
    /// (datapoint → equipment → container) suffices.
    fn escalate_ancestors(&mut self, tree: &ConfigTree) {
        for dp_id in self.read_datapoint_ids.clone() {
            if let Some(dp) = tree.datapoint(dp_id) {
                match dp.owner {
                    OwnerRef::Plc(id) => {
                        self.read_plc_ids.insert(id);
                    }
                    OwnerRef::Container(id) => {
                        self.read_container_ids.insert(id);
                    }
                    OwnerRef::Equipment(id) => {
                        self.read_equipment_ids.insert(id);
                    }
                }
            }
        }
        for eq_id in self.read_equipment_ids.clone() {
            if let Some(eq) = tree.equipment(eq_id) {
                self.read_container_ids.insert(eq.container_id);
            }
        }
        for c_id in self.read_container_ids.clone() {
            if let Some(container) = tree.container(c_id) {
                self.read_plc_ids.insert(container.plc_id);
            }
        }
    }

    pub fn can_read(&self, resource_type: ResourceType, id: u32) -> bool {
        if self.admin {
            return true;
        }
        match resource_type {
            ResourceType::Plc => self.read_plc_ids.contains(&PlcId(id)),
            ResourceType::Container => self.read_container_ids.contains(&ContainerId(id)),
            ResourceType::Equipment => self.read_equipment_ids.contains(&EquipmentId(id)),
            ResourceType::Datapoint => self.read_datapoint_ids.contains(&DataPointId(id)),
        }
    }

    pub fn can_write(&self, resource_type: ResourceType, id: u32) -> bool {
        if self.admin {
            return true;
        }
        match resource_type {
            ResourceType::Plc => self.write_plc_ids.contains(&PlcId(id)),
            ResourceType::Container => self.write_container_ids.contains(&ContainerId(id)),
            ResourceType::Equipment => self.write_equipment_ids.contains(&EquipmentId(id)),
            ResourceType::Datapoint => self.write_datapoint_ids.contains(&DataPointId(id)),
        }
    }

    pub fn can_read_datapoint(&self, id: DataPointId) -> bool {
        self.admin || self.read_datapoint_ids.contains(&id)
    }

    pub fn can_write_datapoint(&self, id: DataPointId) -> bool {
        self.admin || self.write_datapoint_ids.contains(&id)
    }
}

#[cfg(test)]
#[path = "access_tests.rs"]
mod tests;
