//! `ipa_group`: user groups, keyed by `cn`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{entity_call, find_all, index, write_fields};
use crate::context::Scope;
use crate::error::Result;
use crate::model::{sync_value, Desired, Instance, InstanceTable, Properties};
use crate::normalize::{attribute, entries, required_name};
use crate::reconciler::{Provider, Transition};

/// Fixed when the group is created; the directory refuses to change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    Posix,
    NonPosix,
    External,
}

impl GroupType {
    /// Posix groups carry `posixgroup`, external ones `ipaexternalgroup`.
    /// Anything else is non-posix.
    fn from_object_classes(classes: &[String]) -> Self {
        for class in classes {
            match class.to_ascii_lowercase().as_str() {
                "posixgroup" => return Self::Posix,
                "ipaexternalgroup" => return Self::External,
                _ => {}
            }
        }
        Self::NonPosix
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// `gidnumber`, posix groups only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,

    /// Unset means posix when the group is added.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_type: Option<GroupType>,
}

impl Properties for GroupProps {
    fn sync_from(&mut self, desired: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        sync_value("description", &mut self.description, &desired.description, &mut changed);
        sync_value("gid", &mut self.gid, &desired.gid, &mut changed);

        match (self.group_type, desired.group_type) {
            (None, Some(want)) => {
                self.group_type = Some(want);
                changed.push("group_type");
            }
            (Some(have), Some(want)) if have != want => {
                warn!(
                    current = ?have,
                    desired = ?want,
                    "Group type can only be set when the group is created; ignoring"
                );
            }
            _ => {}
        }
        changed
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match (self.gid, self.group_type) {
            (Some(_), Some(GroupType::NonPosix | GroupType::External)) => {
                Err("gid can only be set on posix groups".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GroupProvider;

impl GroupProvider {
    fn instance(entry: &Map<String, Value>) -> Result<Instance<GroupProps>> {
        let name = required_name(entry, "cn")?;
        let classes = attribute(entry, "objectclass").into_strings("objectclass")?;
        let props = GroupProps {
            description: attribute(entry, "description").into_first_string("description")?,
            gid: attribute(entry, "gidnumber").first().into_u32("gidnumber")?,
            group_type: Some(GroupType::from_object_classes(&classes)),
        };
        Ok(Instance::present(name, props))
    }

    fn options(props: &GroupProps, fields: &[&str], adding: bool) -> Map<String, Value> {
        let mut options = Map::new();
        for field in fields {
            match *field {
                "description" => {
                    if let Some(description) = &props.description {
                        options.insert("description".into(), json!(description));
                    }
                }
                "gid" => {
                    if let Some(gid) = props.gid {
                        options.insert("gidnumber".into(), json!(gid));
                    }
                }
                _ => {}
            }
        }
        if adding {
            match props.group_type {
                Some(GroupType::NonPosix) => {
                    options.insert("nonposix".into(), json!(true));
                }
                Some(GroupType::External) => {
                    options.insert("external".into(), json!(true));
                }
                Some(GroupType::Posix) | None => {}
            }
        }
        options
    }
}

#[async_trait]
impl Provider for GroupProvider {
    type Props = GroupProps;

    fn kind(&self) -> &'static str {
        "ipa_group"
    }

    async fn read_all(&self, scope: &mut Scope<'_>) -> Result<InstanceTable<GroupProps>> {
        let payload = scope.call(&find_all("group")).await?;
        let groups = entries(payload)?
            .iter()
            .map(Self::instance)
            .collect::<Result<Vec<_>>>()?;
        debug!(count = groups.len(), "Read groups");
        Ok(index(groups))
    }

    async fn write(
        &self,
        scope: &mut Scope<'_>,
        transition: Transition,
        desired: &Desired<GroupProps>,
        cached: &Instance<GroupProps>,
    ) -> Result<()> {
        let mut request = entity_call("group", transition, &desired.name);

        if transition != Transition::Delete {
            let fields = write_fields(transition, &desired.props, &cached.props);
            let options = Self::options(&desired.props, &fields, transition == Transition::Add);
            if transition == Transition::Modify && options.is_empty() {
                debug!(name = %desired.name, "No group attributes to modify");
                return Ok(());
            }
            request = request.options(options);
        }

        scope.call(&request).await?;
        Ok(())
    }
}
