//! `ipa_dns_zone`: DNS zones, keyed by `idnsname`.
//!
//! Zones are read in raw mode, where attribute names keep their LDAP casing
//! (`idnsAllowDynUpdate`) and booleans are the strings `TRUE`/`FALSE`. Keys
//! are lower-cased at ingest and flags go back out in the same string form.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{entity_call, find_all, index, write_fields};
use crate::context::Scope;
use crate::error::Result;
use crate::model::{deserialize_flag, sync_flag, Desired, Instance, InstanceTable, Properties};
use crate::normalize::{attribute_bool, entries, required_name};
use crate::reconciler::{Provider, Transition};

fn off() -> Option<bool> {
    Some(false)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsZoneProps {
    /// `idnsallowdynupdate`; off unless set.
    #[serde(
        default = "off",
        deserialize_with = "deserialize_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub allow_dynamic_update: Option<bool>,

    /// `idnsallowsyncptr`; off unless set.
    #[serde(
        default = "off",
        deserialize_with = "deserialize_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub allow_sync_ptr: Option<bool>,
}

impl Properties for DnsZoneProps {
    fn sync_from(&mut self, desired: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        sync_flag(
            "allow_dynamic_update",
            &mut self.allow_dynamic_update,
            &desired.allow_dynamic_update,
            &mut changed,
        );
        sync_flag(
            "allow_sync_ptr",
            &mut self.allow_sync_ptr,
            &desired.allow_sync_ptr,
            &mut changed,
        );
        changed
    }
}

fn ldap_flag(value: bool) -> Value {
    json!(if value { "TRUE" } else { "FALSE" })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DnsZoneProvider;

impl DnsZoneProvider {
    fn instance(entry: &Map<String, Value>) -> Result<Instance<DnsZoneProps>> {
        let name = required_name(entry, "idnsname")?;
        let props = DnsZoneProps {
            allow_dynamic_update: attribute_bool(entry, "idnsallowdynupdate")?,
            allow_sync_ptr: attribute_bool(entry, "idnsallowsyncptr")?,
        };
        Ok(Instance::present(name, props))
    }

    /// Add sends every flag the caller set, modify only the ones that differ.
    fn options(
        transition: Transition,
        desired: &DnsZoneProps,
        cached: &DnsZoneProps,
    ) -> Map<String, Value> {
        let fields = match transition {
            Transition::Add => vec!["allow_dynamic_update", "allow_sync_ptr"],
            Transition::Modify | Transition::Delete => write_fields(transition, desired, cached),
        };

        let mut options = Map::new();
        for field in fields {
            let (key, value) = match field {
                "allow_dynamic_update" => ("idnsallowdynupdate", desired.allow_dynamic_update),
                "allow_sync_ptr" => ("idnsallowsyncptr", desired.allow_sync_ptr),
                _ => continue,
            };
            if let Some(value) = value {
                options.insert(key.to_string(), ldap_flag(value));
            }
        }
        options
    }
}

#[async_trait]
impl Provider for DnsZoneProvider {
    type Props = DnsZoneProps;

    fn kind(&self) -> &'static str {
        "ipa_dns_zone"
    }

    async fn read_all(&self, scope: &mut Scope<'_>) -> Result<InstanceTable<DnsZoneProps>> {
        let payload = scope.call(&find_all("dnszone").option("raw", true)).await?;
        let zones = entries(payload)?
            .iter()
            .map(Self::instance)
            .collect::<Result<Vec<_>>>()?;
        debug!(count = zones.len(), "Read DNS zones");
        Ok(index(zones))
    }

    async fn write(
        &self,
        scope: &mut Scope<'_>,
        transition: Transition,
        desired: &Desired<DnsZoneProps>,
        cached: &Instance<DnsZoneProps>,
    ) -> Result<()> {
        let mut request = entity_call("dnszone", transition, &desired.name);

        if transition != Transition::Delete {
            let options = Self::options(transition, &desired.props, &cached.props);
            if transition == Transition::Modify && options.is_empty() {
                debug!(name = %desired.name, "No zone attributes to modify");
                return Ok(());
            }
            request = request.options(options);
        }

        scope.call(&request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::lowercase_keys;

    fn raw_entry(raw: Value) -> Map<String, Value> {
        match raw {
            Value::Object(map) => lowercase_keys(map),
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn raw_attributes_are_read_case_insensitively() {
        let zone = DnsZoneProvider::instance(&raw_entry(json!({
            "idnsName": ["example.test."],
            "idnsAllowDynUpdate": ["TRUE"],
        })))
        .unwrap();

        assert_eq!(zone.name, "example.test.");
        assert_eq!(zone.props.allow_dynamic_update, Some(true));
        assert_eq!(zone.props.allow_sync_ptr, None);
    }

    #[test]
    fn flags_default_off_when_deserialized() {
        let props: DnsZoneProps = serde_yaml::from_str("allow_sync_ptr: 'yes'").unwrap();
        assert_eq!(props.allow_dynamic_update, Some(false));
        assert_eq!(props.allow_sync_ptr, Some(true));
    }

    #[test]
    fn add_writes_both_flags_as_ldap_strings() {
        let desired = DnsZoneProps {
            allow_dynamic_update: Some(false),
            allow_sync_ptr: Some(true),
        };
        let options = DnsZoneProvider::options(Transition::Add, &desired, &DnsZoneProps::default());
        assert_eq!(
            Value::Object(options),
            json!({"idnsallowdynupdate": "FALSE", "idnsallowsyncptr": "TRUE"})
        );
    }

    #[test]
    fn unreturned_flag_matches_desired_off() {
        let cached = DnsZoneProps {
            allow_dynamic_update: Some(true),
            allow_sync_ptr: None,
        };
        let desired = DnsZoneProps {
            allow_dynamic_update: Some(false),
            allow_sync_ptr: Some(false),
        };
        let options = DnsZoneProvider::options(Transition::Modify, &desired, &cached);
        assert_eq!(Value::Object(options), json!({"idnsallowdynupdate": "FALSE"}));
    }
}
