//! `ipa_user`: directory users, keyed by `uid`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{entity_call, find_all, index, write_fields};
use crate::config::Secret;
use crate::context::Scope;
use crate::error::Result;
use crate::list;
use crate::model::{
    deserialize_flag, sync_list, sync_value, Desired, Instance, InstanceTable, Properties,
};
use crate::normalize::{attribute, attribute_bool, canonical, entries, required_name};
use crate::reconciler::{read_from_table, Provider, Transition};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProps {
    /// `givenname`; defaults to the user name on add.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// `sn`; defaults to the user name on add.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Inverse of `nsaccountlock`.
    #[serde(
        deserialize_with = "deserialize_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub enable: Option<bool>,

    #[serde(
        deserialize_with = "list::deserialize_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub sshpubkeys: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_shell: Option<String>,

    /// Every address of the user; a single string is a one-element list.
    #[serde(
        deserialize_with = "list::deserialize_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub mail: Option<Vec<String>>,

    /// `title`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,

    /// Extra LDAP attributes, keys lower-cased. Only the keys given here are
    /// compared against the directory.
    #[serde(
        deserialize_with = "deserialize_attributes",
        skip_serializing_if = "Option::is_none"
    )]
    pub ldap_attributes: Option<BTreeMap<String, Value>>,

    /// Sent once, when the user is added. Never read back.
    #[serde(skip_serializing)]
    pub initial_password: Option<Secret>,
}

impl Properties for UserProps {
    fn sync_from(&mut self, desired: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        sync_value("first_name", &mut self.first_name, &desired.first_name, &mut changed);
        sync_value("last_name", &mut self.last_name, &desired.last_name, &mut changed);
        sync_value("enable", &mut self.enable, &desired.enable, &mut changed);
        sync_list("sshpubkeys", &mut self.sshpubkeys, &desired.sshpubkeys, &mut changed);
        sync_value("login_shell", &mut self.login_shell, &desired.login_shell, &mut changed);
        sync_list("mail", &mut self.mail, &desired.mail, &mut changed);
        sync_value("job_title", &mut self.job_title, &desired.job_title, &mut changed);

        if let Some(want) = &desired.ldap_attributes {
            let have = self.ldap_attributes.get_or_insert_with(BTreeMap::new);
            let mut differs = false;
            for (key, value) in want {
                if have.get(key) != Some(value) {
                    have.insert(key.clone(), value.clone());
                    differs = true;
                }
            }
            if differs {
                changed.push("ldap_attributes");
            }
        }
        changed
    }
}

type Attributes = BTreeMap<String, Value>;

fn deserialize_attributes<'de, D>(deserializer: D) -> std::result::Result<Option<Attributes>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Attributes>::deserialize(deserializer)?.map(|attrs| {
        attrs
            .into_iter()
            .map(|(key, value)| (key.to_lowercase(), canonical(&value)))
            .collect()
    }))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UserProvider;

impl UserProvider {
    fn instance(entry: &Map<String, Value>) -> Result<Instance<UserProps>> {
        let name = required_name(entry, "uid")?;
        let locked = attribute_bool(entry, "nsaccountlock")?.unwrap_or(false);

        let sshpubkeys = match attribute(entry, "ipasshpubkey") {
            raw if raw.is_absent() => None,
            raw => Some(list::normalize(&raw.into_strings("ipasshpubkey")?)),
        };

        let ldap_attributes = entry
            .keys()
            .map(|key| (key.clone(), canonical(&attribute(entry, key).to_json())))
            .collect();

        let mail = match attribute(entry, "mail") {
            raw if raw.is_absent() => None,
            raw => Some(list::normalize(&raw.into_strings("mail")?)),
        };

        let props = UserProps {
            first_name: attribute(entry, "givenname").into_first_string("givenname")?,
            last_name: attribute(entry, "sn").into_first_string("sn")?,
            enable: Some(!locked),
            sshpubkeys,
            login_shell: attribute(entry, "loginshell").into_first_string("loginshell")?,
            mail,
            job_title: attribute(entry, "title").into_first_string("title")?,
            ldap_attributes: Some(ldap_attributes),
            initial_password: None,
        };
        Ok(Instance::present(name, props))
    }

    fn options(props: &UserProps, fields: &[&str], cached: &UserProps) -> Map<String, Value> {
        let mut options = Map::new();
        for field in fields {
            match *field {
                "first_name" => put(&mut options, "givenname", &props.first_name),
                "last_name" => put(&mut options, "sn", &props.last_name),
                "enable" => {
                    if let Some(enable) = props.enable {
                        options.insert("nsaccountlock".into(), json!(!enable));
                    }
                }
                "sshpubkeys" => {
                    if let Some(keys) = &props.sshpubkeys {
                        options.insert("ipasshpubkey".into(), json!(list::normalize(keys)));
                    }
                }
                "login_shell" => put(&mut options, "loginshell", &props.login_shell),
                "mail" => {
                    if let Some(mail) = &props.mail {
                        options.insert("mail".into(), json!(list::normalize(mail)));
                    }
                }
                "job_title" => put(&mut options, "title", &props.job_title),
                "ldap_attributes" => {
                    let have = cached.ldap_attributes.as_ref();
                    for (key, value) in props.ldap_attributes.iter().flatten() {
                        if have.and_then(|attrs| attrs.get(key)) != Some(value) {
                            options.insert(key.clone(), value.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        options
    }
}

fn put(options: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        options.insert(key.to_string(), json!(value));
    }
}

#[async_trait]
impl Provider for UserProvider {
    type Props = UserProps;

    fn kind(&self) -> &'static str {
        "ipa_user"
    }

    async fn read_all(&self, scope: &mut Scope<'_>) -> Result<InstanceTable<UserProps>> {
        let payload = scope.call(&find_all("user")).await?;
        let users = entries(payload)?
            .iter()
            .map(Self::instance)
            .collect::<Result<Vec<_>>>()?;
        debug!(count = users.len(), "Read users");
        Ok(index(users))
    }

    /// Table lookup, with `ldap_attributes` cut down to the keys the caller
    /// manages.
    async fn read_one(
        &self,
        scope: &mut Scope<'_>,
        desired: &Desired<UserProps>,
        fresh: bool,
    ) -> Result<Instance<UserProps>> {
        let mut instance = read_from_table(self, scope, desired, fresh).await?;
        instance.props.ldap_attributes = match &desired.props.ldap_attributes {
            Some(wanted) => Some(
                instance
                    .props
                    .ldap_attributes
                    .take()
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|(key, _)| wanted.contains_key(key))
                    .collect(),
            ),
            None => None,
        };
        Ok(instance)
    }

    async fn write(
        &self,
        scope: &mut Scope<'_>,
        transition: Transition,
        desired: &Desired<UserProps>,
        cached: &Instance<UserProps>,
    ) -> Result<()> {
        let mut request = entity_call("user", transition, &desired.name);

        if transition != Transition::Delete {
            let fields = write_fields(transition, &desired.props, &cached.props);
            let mut options = Self::options(&desired.props, &fields, &cached.props);

            if transition == Transition::Add {
                options
                    .entry("givenname")
                    .or_insert_with(|| json!(desired.name));
                options.entry("sn").or_insert_with(|| json!(desired.name));
                if let Some(password) = &desired.props.initial_password {
                    options.insert("userpassword".into(), json!(password.expose()));
                }
            } else if options.is_empty() {
                debug!(name = %desired.name, "No user attributes to modify");
                return Ok(());
            }
            request = request.options(options);
        }

        scope.call(&request).await?;
        Ok(())
    }
}
