//! Resource kinds
//!
//! One [`Provider`](crate::reconciler::Provider) per directory object type.
//! The HTTP kinds share the request helpers below; `kinit` shells out instead.

pub mod dns_zone;
pub mod group;
pub mod group_membership;
pub mod kinit;
pub mod service;
pub mod user;

pub use dns_zone::{DnsZoneProps, DnsZoneProvider};
pub use group::{GroupProps, GroupProvider, GroupType};
pub use group_membership::{GroupMembershipProvider, MembershipProps};
pub use kinit::{CommandRunner, KinitProps, KinitProvider, SystemCommandRunner};
pub use service::{ServiceProps, ServiceProvider};
pub use user::{UserProps, UserProvider};

use ipa_client::RpcRequest;

use crate::model::{Instance, InstanceTable, Properties};
use crate::reconciler::Transition;

/// `<object>_find/1` with every attribute.
pub(crate) fn find_all(object: &str) -> RpcRequest {
    RpcRequest::new(format!("{object}_find/1")).option("all", true)
}

/// Write call for one entity: `<object>_add/1`, `_mod/1` or `_del/1`.
pub(crate) fn entity_call(object: &str, transition: Transition, name: &str) -> RpcRequest {
    let action = match transition {
        Transition::Add => "add",
        Transition::Modify => "mod",
        Transition::Delete => "del",
    };
    RpcRequest::new(format!("{object}_{action}/1")).arg(name)
}

/// Fields a write must send.
///
/// An add sends every managed field; a modify sends only those whose desired
/// value differs from the instance read at the start of the run.
pub(crate) fn write_fields<P: Properties>(
    transition: Transition,
    desired: &P,
    cached: &P,
) -> Vec<&'static str> {
    let mut base = match transition {
        Transition::Add => P::default(),
        Transition::Modify | Transition::Delete => cached.clone(),
    };
    base.sync_from(desired)
}

pub(crate) fn index<P>(instances: impl IntoIterator<Item = Instance<P>>) -> InstanceTable<P> {
    instances
        .into_iter()
        .map(|instance| (instance.name.clone(), instance))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::testing::NoteProps;

    #[test]
    fn modify_sends_only_differences() {
        let desired = NoteProps {
            note: Some("same".into()),
        };
        assert!(write_fields(Transition::Modify, &desired, &desired.clone()).is_empty());
        assert_eq!(
            write_fields(Transition::Add, &desired, &desired.clone()),
            vec!["note"]
        );
    }

    #[test]
    fn entity_calls_are_versioned() {
        let request = entity_call("group", Transition::Modify, "admins");
        assert_eq!(request.method, "group_mod/1");
        assert_eq!(request.args(), &[serde_json::json!("admins")]);
        assert_eq!(find_all("user").named_options()["all"], serde_json::json!(true));
    }
}
