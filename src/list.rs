//! List-valued property reconciliation
//!
//! A membership list is either the complete authoritative set (`inclusive`)
//! or a lower bound (`minimum`). All comparisons happen on sorted,
//! de-duplicated copies, so neither source ordering nor repeated entries
//! ever cause a spurious write.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

/// How a desired list relates to what the directory already holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipMode {
    /// Desired list is complete; anything else is removed.
    Inclusive,
    /// Desired list is a lower bound; unknown members are kept.
    #[default]
    Minimum,
}

/// Sorted, de-duplicated copy of a list.
pub fn normalize<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.as_ref().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Final set for a list property.
///
/// An absent current value is the empty list.
pub fn resolve(desired: &[String], mode: MembershipMode, current: Option<&[String]>) -> Vec<String> {
    match mode {
        MembershipMode::Inclusive => normalize(desired),
        MembershipMode::Minimum => {
            let mut all: BTreeSet<String> = desired.iter().cloned().collect();
            all.extend(current.unwrap_or_default().iter().cloned());
            all.into_iter().collect()
        }
    }
}

/// Order- and duplicate-insensitive equality.
pub fn equal<A: AsRef<str>, B: AsRef<str>>(a: &[A], b: &[B]) -> bool {
    normalize(a) == normalize(b)
}

/// Members of `target` not yet in `current`: what an "add member" call submits.
pub fn additions(target: &[String], current: Option<&[String]>) -> Vec<String> {
    let current: BTreeSet<&String> = current.unwrap_or_default().iter().collect();
    normalize(target)
        .into_iter()
        .filter(|m| !current.contains(m))
        .collect()
}

/// Members of `current` not in `desired`: what an inclusive "remove member"
/// call submits. Always empty under `minimum`.
pub fn removals(desired: &[String], mode: MembershipMode, current: Option<&[String]>) -> Vec<String> {
    if mode == MembershipMode::Minimum {
        return Vec::new();
    }
    let desired: BTreeSet<&String> = desired.iter().collect();
    normalize(current.unwrap_or_default())
        .into_iter()
        .filter(|m| !desired.contains(m))
        .collect()
}

/// Members of `desired` that `current` holds: what a destroy submits.
pub fn present(desired: &[String], current: Option<&[String]>) -> Vec<String> {
    let current: BTreeSet<&String> = current.unwrap_or_default().iter().collect();
    normalize(desired)
        .into_iter()
        .filter(|m| current.contains(m))
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Deserialize a list property, accepting a bare scalar as a one-element list.
pub fn deserialize_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<OneOrMany>::deserialize(deserializer)?.map(|v| match v {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(list) => list,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn minimum_keeps_unknown_members() {
        let desired = strings(&["bob"]);
        let current = strings(&["alice"]);
        assert_eq!(
            resolve(&desired, MembershipMode::Minimum, Some(current.as_slice())),
            strings(&["alice", "bob"])
        );
    }

    #[test]
    fn inclusive_drops_unknown_members() {
        let desired = strings(&["bob"]);
        let current = strings(&["alice"]);
        assert_eq!(
            resolve(&desired, MembershipMode::Inclusive, Some(current.as_slice())),
            strings(&["bob"])
        );
        assert_eq!(
            removals(&desired, MembershipMode::Inclusive, Some(current.as_slice())),
            strings(&["alice"])
        );
        assert!(removals(&desired, MembershipMode::Minimum, Some(current.as_slice())).is_empty());
    }

    #[test]
    fn absent_current_is_empty() {
        let desired = strings(&["b", "a", "b"]);
        assert_eq!(
            resolve(&desired, MembershipMode::Minimum, None),
            strings(&["a", "b"])
        );
        assert_eq!(additions(&desired, None), strings(&["a", "b"]));
        assert!(present(&desired, None).is_empty());
    }

    #[test]
    fn equality_ignores_order_and_duplicates() {
        assert!(equal(&["b", "a", "a"], &["a", "b"]));
        assert!(!equal(&["a"], &["a", "b"]));
        assert!(equal::<&str, &str>(&[], &[]));
    }

    #[test]
    fn additions_skip_existing_members() {
        let current = strings(&["alice"]);
        assert_eq!(
            additions(&strings(&["alice", "bob"]), Some(current.as_slice())),
            strings(&["bob"])
        );
    }

    #[test]
    fn scalar_deserializes_as_singleton() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(default, deserialize_with = "deserialize_list")]
            users: Option<Vec<String>>,
        }

        let one: Holder = serde_yaml::from_str("users: alice").unwrap();
        assert_eq!(one.users, Some(strings(&["alice"])));
        let many: Holder = serde_yaml::from_str("users: [alice, bob]").unwrap();
        assert_eq!(many.users, Some(strings(&["alice", "bob"])));
        let none: Holder = serde_yaml::from_str("{}").unwrap();
        assert_eq!(none.users, None);
    }

    fn member_list() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec("[a-e]{1,3}", 0..8)
    }

    proptest! {
        #[test]
        fn minimum_is_sorted_superset(desired in member_list(), current in member_list()) {
            let resolved = resolve(&desired, MembershipMode::Minimum, Some(current.as_slice()));
            for member in desired.iter().chain(current.iter()) {
                prop_assert!(resolved.contains(member));
            }
            prop_assert_eq!(resolved.clone(), normalize(&resolved));
        }

        #[test]
        fn minimum_is_order_independent(desired in member_list(), current in member_list()) {
            let mut reversed = desired.clone();
            reversed.reverse();
            prop_assert_eq!(
                resolve(&desired, MembershipMode::Minimum, Some(current.as_slice())),
                resolve(&reversed, MembershipMode::Minimum, Some(current.as_slice()))
            );
        }

        #[test]
        fn inclusive_ignores_current(desired in member_list(), current in member_list()) {
            prop_assert_eq!(
                resolve(&desired, MembershipMode::Inclusive, Some(current.as_slice())),
                normalize(&desired)
            );
        }

        #[test]
        fn applying_the_diff_reaches_the_final_set(
            desired in member_list(),
            current in member_list(),
            inclusive in any::<bool>(),
        ) {
            let mode = if inclusive { MembershipMode::Inclusive } else { MembershipMode::Minimum };
            let target = resolve(&desired, mode, Some(current.as_slice()));
            let mut after: BTreeSet<String> = current.iter().cloned().collect();
            after.extend(additions(&target, Some(current.as_slice())));
            for gone in removals(&desired, mode, Some(current.as_slice())) {
                after.remove(&gone);
            }
            prop_assert_eq!(after.into_iter().collect::<Vec<_>>(), target);
        }
    }
}
