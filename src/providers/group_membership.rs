//! `ipa_group_membership`: the member lists of one group.
//!
//! Memberships are read live from the group each time rather than from a
//! bulk table, since another resource in the same run may have just created
//! the group. The instance is read once at `exists`; the add and remove sets
//! are diffed once, in `write`, against that same read.

use async_trait::async_trait;
use ipa_client::RpcRequest;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::context::Scope;
use crate::error::Result;
use crate::list::{self, MembershipMode};
use crate::model::{Desired, Ensure, Instance, InstanceTable, Properties};
use crate::normalize::{attribute, entries, required_name};
use crate::reconciler::{Provider, Transition};

/// (property, directory attribute, add/remove option key)
const MEMBER_LISTS: [(&str, &str, &str); 3] = [
    ("groups", "member_group", "group"),
    ("users", "member_user", "user"),
    ("services", "member_service", "service"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipProps {
    /// Group whose members are managed; defaults to the resource name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(
        deserialize_with = "list::deserialize_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub groups: Option<Vec<String>>,

    #[serde(
        deserialize_with = "list::deserialize_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub users: Option<Vec<String>>,

    #[serde(
        deserialize_with = "list::deserialize_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub services: Option<Vec<String>>,

    /// Applies to every list above.
    #[serde(skip_serializing)]
    pub membership: MembershipMode,
}

impl MembershipProps {
    fn list(&self, property: &str) -> Option<&Vec<String>> {
        match property {
            "groups" => self.groups.as_ref(),
            "users" => self.users.as_ref(),
            "services" => self.services.as_ref(),
            _ => None,
        }
    }

    fn list_mut(&mut self, property: &str) -> Option<&mut Option<Vec<String>>> {
        match property {
            "groups" => Some(&mut self.groups),
            "users" => Some(&mut self.users),
            "services" => Some(&mut self.services),
            _ => None,
        }
    }
}

impl Properties for MembershipProps {
    /// Move every managed list to its final set under the membership mode.
    fn sync_from(&mut self, desired: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        for (property, _, _) in MEMBER_LISTS {
            let Some(want) = desired.list(property) else {
                continue;
            };
            let Some(slot) = self.list_mut(property) else {
                continue;
            };
            let target = list::resolve(want, desired.membership, slot.as_deref());
            if !list::equal(slot.as_deref().unwrap_or_default(), &target) {
                *slot = Some(target);
                changed.push(property);
            }
        }
        changed
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GroupMembershipProvider;

impl GroupMembershipProvider {
    fn group_name(desired: &Desired<MembershipProps>) -> &str {
        desired.props.group.as_deref().unwrap_or(&desired.name)
    }

    /// Instance for `desired` out of the group's directory entry.
    ///
    /// Only the lists `desired` manages are filled in. When the caller wants
    /// the membership gone and none of its members are left, the instance
    /// is absent.
    fn instance(
        desired: &Desired<MembershipProps>,
        entry: &Map<String, Value>,
    ) -> Result<Instance<MembershipProps>> {
        let mut props = MembershipProps {
            group: Some(required_name(entry, "cn")?),
            ..Default::default()
        };
        for (property, attr, _) in MEMBER_LISTS {
            if desired.props.list(property).is_none() {
                continue;
            }
            let members = list::normalize(&attribute(entry, attr).into_strings(attr)?);
            if let Some(slot) = props.list_mut(property) {
                *slot = Some(members);
            }
        }

        if desired.ensure == Ensure::Absent {
            let any_left = MEMBER_LISTS.iter().any(|(property, _, _)| {
                let want = desired.props.list(property).map(Vec::as_slice).unwrap_or_default();
                !list::present(want, props.list(property).map(Vec::as_slice)).is_empty()
            });
            if !any_left {
                return Ok(Instance::absent(desired.name.as_str()));
            }
        }
        Ok(Instance::present(desired.name.as_str(), props))
    }

    /// Option maps for the `group_add_member` and `group_remove_member` calls.
    fn member_changes(
        transition: Transition,
        desired: &MembershipProps,
        cached: &MembershipProps,
    ) -> (Map<String, Value>, Map<String, Value>) {
        let mut add = Map::new();
        let mut remove = Map::new();

        for (property, _, option) in MEMBER_LISTS {
            let Some(want) = desired.list(property) else {
                continue;
            };
            let current = cached.list(property).map(Vec::as_slice);

            let (additions, removals) = match transition {
                Transition::Add | Transition::Modify => {
                    let target = list::resolve(want, desired.membership, current);
                    (
                        list::additions(&target, current),
                        list::removals(want, desired.membership, current),
                    )
                }
                Transition::Delete => (Vec::new(), list::present(want, current)),
            };

            if !additions.is_empty() {
                add.insert(option.to_string(), json!(additions));
            }
            if !removals.is_empty() {
                remove.insert(option.to_string(), json!(removals));
            }
        }
        (add, remove)
    }
}

#[async_trait]
impl Provider for GroupMembershipProvider {
    type Props = MembershipProps;

    fn kind(&self) -> &'static str {
        "ipa_group_membership"
    }

    /// Every group's member lists, keyed by group name.
    async fn read_all(&self, scope: &mut Scope<'_>) -> Result<InstanceTable<MembershipProps>> {
        let payload = scope.call(&super::find_all("group")).await?;
        let mut table = InstanceTable::new();
        for entry in entries(payload)? {
            let name = required_name(&entry, "cn")?;
            let everything = Desired::present(
                name.as_str(),
                MembershipProps {
                    groups: Some(Vec::new()),
                    users: Some(Vec::new()),
                    services: Some(Vec::new()),
                    ..Default::default()
                },
            );
            table.insert(name, Self::instance(&everything, &entry)?);
        }
        Ok(table)
    }

    /// Live `group_find` on the one group; never cached.
    async fn read_one(
        &self,
        scope: &mut Scope<'_>,
        desired: &Desired<MembershipProps>,
        _fresh: bool,
    ) -> Result<Instance<MembershipProps>> {
        let group = Self::group_name(desired);
        let payload = scope.call(&super::find_all("group").arg(group)).await?;

        for entry in entries(payload)? {
            if required_name(&entry, "cn")? == group {
                let instance = Self::instance(desired, &entry)?;
                debug!(group, present = instance.is_present(), "Read group membership");
                return Ok(instance);
            }
        }
        debug!(group, "Group not found");
        Ok(Instance::absent(desired.name.as_str()))
    }

    async fn write(
        &self,
        scope: &mut Scope<'_>,
        transition: Transition,
        desired: &Desired<MembershipProps>,
        cached: &Instance<MembershipProps>,
    ) -> Result<()> {
        let group = Self::group_name(desired);
        let (add, remove) = Self::member_changes(transition, &desired.props, &cached.props);

        if !add.is_empty() {
            let request = RpcRequest::new("group_add_member/1")
                .arg(group)
                .options(add);
            scope.call(&request).await?;
        }
        if !remove.is_empty() {
            let request = RpcRequest::new("group_remove_member/1")
                .arg(group)
                .options(remove);
            scope.call(&request).await?;
        }
        Ok(())
    }
}
