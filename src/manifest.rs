//! YAML manifest
//!
//! ```yaml
//! connection:
//!   api_url: https://ipa.example.com/ipa
//!   username: admin
//!   # password from IPA_API_PASSWORD
//! resources:
//!   - type: ipa_group
//!     name: admins
//!     description: Administrators
//!   - type: ipa_group_membership
//!     name: admins
//!     users: [alice, bob]
//!     membership: inclusive
//! ```
//!
//! Resources are applied in the order they are listed.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::config::ConnectionSpec;
use crate::error::{ReconcileError, Result};
use crate::model::{Desired, Ensure};
use crate::providers::{
    DnsZoneProps, GroupProps, KinitProps, MembershipProps, ServiceProps, UserProps,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub connection: ConnectionSpec,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
}

impl Manifest {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReconcileError::Manifest(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }
}

/// One desired entity, tagged by kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ResourceSpec {
    #[serde(rename = "ipa_user")]
    User(Desired<UserProps>),
    #[serde(rename = "ipa_group")]
    Group(Desired<GroupProps>),
    #[serde(rename = "ipa_group_membership")]
    GroupMembership(Desired<MembershipProps>),
    #[serde(rename = "ipa_service")]
    Service(Desired<ServiceProps>),
    #[serde(rename = "ipa_dns_zone")]
    DnsZone(Desired<DnsZoneProps>),
    #[serde(rename = "ipa_kinit")]
    Kinit(Desired<KinitProps>),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::User(_) => ResourceKind::User,
            Self::Group(_) => ResourceKind::Group,
            Self::GroupMembership(_) => ResourceKind::GroupMembership,
            Self::Service(_) => ResourceKind::Service,
            Self::DnsZone(_) => ResourceKind::DnsZone,
            Self::Kinit(_) => ResourceKind::Kinit,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::User(d) => &d.name,
            Self::Group(d) => &d.name,
            Self::GroupMembership(d) => &d.name,
            Self::Service(d) => &d.name,
            Self::DnsZone(d) => &d.name,
            Self::Kinit(d) => &d.name,
        }
    }

    pub fn ensure(&self) -> Ensure {
        match self {
            Self::User(d) => d.ensure,
            Self::Group(d) => d.ensure,
            Self::GroupMembership(d) => d.ensure,
            Self::Service(d) => d.ensure,
            Self::DnsZone(d) => d.ensure,
            Self::Kinit(d) => d.ensure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    User,
    Group,
    GroupMembership,
    Service,
    DnsZone,
    Kinit,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        Self::User,
        Self::Group,
        Self::GroupMembership,
        Self::Service,
        Self::DnsZone,
        Self::Kinit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "ipa_user",
            Self::Group => "ipa_group",
            Self::GroupMembership => "ipa_group_membership",
            Self::Service => "ipa_service",
            Self::DnsZone => "ipa_dns_zone",
            Self::Kinit => "ipa_kinit",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| {
                let full = kind.as_str();
                full == wanted || full.trim_start_matches("ipa_") == wanted
            })
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown resource type '{s}', expected one of: {}", known.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::list::MembershipMode;
    use crate::providers::GroupType;

    const MANIFEST: &str = r#"
connection:
  api_url: https://ipa.example.test/ipa
  username: admin
  password: secret
  tls_verify: true
resources:
  - type: ipa_user
    name: bob
    first_name: Bob
    sshpubkeys: ssh-ed25519 AAAA
    initial_password: changeme
  - type: ipa_group
    name: admins
    description: Administrators
    group_type: posix
    gid: 1500
  - type: ipa_group_membership
    name: admins
    users: [alice, bob]
    membership: inclusive
  - type: ipa_service
    name: HTTP/web.example.test@EXAMPLE.TEST
    ensure: absent
  - type: ipa_dns_zone
    name: example.test.
    allow_sync_ptr: true
  - type: ipa_kinit
    name: admin
    realm: example.test
    password: secret
"#;

    #[test]
    fn parses_every_kind_in_order() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();
        let kinds: Vec<_> = manifest.resources.iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, ResourceKind::ALL.to_vec());

        match &manifest.resources[0] {
            ResourceSpec::User(user) => {
                assert_eq!(user.props.first_name.as_deref(), Some("Bob"));
                assert_eq!(user.props.sshpubkeys, Some(vec!["ssh-ed25519 AAAA".to_string()]));
                assert_eq!(user.ensure, Ensure::Present);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &manifest.resources[1] {
            ResourceSpec::Group(group) => {
                assert_eq!(group.props.gid, Some(1500));
                assert_eq!(group.props.group_type, Some(GroupType::Posix));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &manifest.resources[2] {
            ResourceSpec::GroupMembership(m) => {
                assert_eq!(m.props.membership, MembershipMode::Inclusive);
                assert_eq!(m.props.users.as_ref().map(Vec::len), Some(2));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(manifest.resources[3].ensure(), Ensure::Absent);
        match &manifest.resources[4] {
            ResourceSpec::DnsZone(zone) => {
                assert_eq!(zone.props.allow_sync_ptr, Some(true));
                assert_eq!(zone.props.allow_dynamic_update, Some(false));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = Manifest::from_yaml("resources:\n  - type: ipa_host\n    name: x\n").unwrap_err();
        assert!(matches!(err, ReconcileError::Yaml(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();
        let manifest = Manifest::load(file.path()).unwrap();
        assert_eq!(manifest.resources.len(), 6);
        assert_eq!(manifest.connection.username.as_deref(), Some("admin"));
    }

    #[test]
    fn missing_file_is_a_manifest_error() {
        let err = Manifest::load("/nonexistent/manifest.yaml").unwrap_err();
        assert!(matches!(err, ReconcileError::Manifest(_)));
    }

    #[test]
    fn kind_names_parse_with_or_without_prefix() {
        assert_eq!("ipa_user".parse::<ResourceKind>(), Ok(ResourceKind::User));
        assert_eq!("dns_zone".parse::<ResourceKind>(), Ok(ResourceKind::DnsZone));
        assert!("host".parse::<ResourceKind>().is_err());
    }
}
