//! Desired and observed state
//!
//! A resource kind is described by one property struct `P`. The same struct
//! carries both sides: in a [`Desired`] a `None` field is unmanaged, in an
//! [`Instance`] a `None` field was not returned by the directory.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::list;
use crate::normalize::boolify;

/// Presence intent of a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

impl fmt::Display for Ensure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => f.write_str("present"),
            Self::Absent => f.write_str("absent"),
        }
    }
}

/// Typed property set of one resource kind.
pub trait Properties: Clone + fmt::Debug + Default + PartialEq + Send + Sync + 'static {
    /// Property-setter step: overwrite every managed field of `self` whose
    /// desired value differs, and return the names of the fields that changed.
    fn sync_from(&mut self, desired: &Self) -> Vec<&'static str>;

    /// Reject desired states the directory would refuse.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// What the caller wants one entity to look like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Desired<P> {
    pub name: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(flatten)]
    pub props: P,
}

impl<P: Default> Desired<P> {
    pub fn present(name: impl Into<String>, props: P) -> Self {
        Self {
            name: name.into(),
            ensure: Ensure::Present,
            props,
        }
    }

    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ensure: Ensure::Absent,
            props: P::default(),
        }
    }
}

/// What the directory holds for one namevar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instance<P> {
    pub name: String,
    pub ensure: Ensure,
    #[serde(flatten)]
    pub props: P,
}

impl<P: Default> Instance<P> {
    pub fn present(name: impl Into<String>, props: P) -> Self {
        Self {
            name: name.into(),
            ensure: Ensure::Present,
            props,
        }
    }

    /// Sentinel for "no such entity".
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ensure: Ensure::Absent,
            props: P::default(),
        }
    }

    pub fn is_present(&self) -> bool {
        self.ensure == Ensure::Present
    }
}

/// Bulk read of one kind, keyed by namevar.
pub type InstanceTable<P> = BTreeMap<String, Instance<P>>;

/// Copy of the table entry for `name`, or the absent sentinel.
pub fn lookup<P: Clone + Default>(table: &InstanceTable<P>, name: &str) -> Instance<P> {
    table
        .get(name)
        .cloned()
        .unwrap_or_else(|| Instance::absent(name))
}

/// Overwrite `current` with `desired` when it is managed and differs.
pub fn sync_value<T: PartialEq + Clone>(
    field: &'static str,
    current: &mut Option<T>,
    desired: &Option<T>,
    changed: &mut Vec<&'static str>,
) {
    if let Some(want) = desired {
        if current.as_ref() != Some(want) {
            *current = Some(want.clone());
            changed.push(field);
        }
    }
}

/// Flag flavour of [`sync_value`]: an attribute the directory did not return
/// reads as off.
pub fn sync_flag(
    field: &'static str,
    current: &mut Option<bool>,
    desired: &Option<bool>,
    changed: &mut Vec<&'static str>,
) {
    if let Some(want) = desired {
        if current.unwrap_or(false) != *want {
            *current = Some(*want);
            changed.push(field);
        }
    }
}

/// List flavour of [`sync_value`]: compared sorted and de-duplicated.
pub fn sync_list(
    field: &'static str,
    current: &mut Option<Vec<String>>,
    desired: &Option<Vec<String>>,
    changed: &mut Vec<&'static str>,
) {
    if let Some(want) = desired {
        let have = current.as_deref().unwrap_or_default();
        if !list::equal(have, want) {
            *current = Some(list::normalize(want));
            changed.push(field);
        }
    }
}

/// Deserialize a desired flag with the same spellings the directory uses
/// (`yes`, `"TRUE"`, `false`, ...).
pub fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => boolify(&raw).map(Some).map_err(D::Error::custom),
    }
}
