//! `ipa_service`: Kerberos service principals, keyed by `krbprincipalname`.
//! Presence is the only managed state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{entity_call, find_all, index};
use crate::context::Scope;
use crate::error::Result;
use crate::model::{Desired, Instance, InstanceTable, Properties};
use crate::normalize::{attribute, entries, NormalizeError};
use crate::reconciler::{Provider, Transition};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceProps {}

impl Properties for ServiceProps {
    fn sync_from(&mut self, _desired: &Self) -> Vec<&'static str> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceProvider;

#[async_trait]
impl Provider for ServiceProvider {
    type Props = ServiceProps;

    fn kind(&self) -> &'static str {
        "ipa_service"
    }

    async fn read_all(&self, scope: &mut Scope<'_>) -> Result<InstanceTable<ServiceProps>> {
        let payload = scope.call(&find_all("service")).await?;
        let mut services = Vec::new();
        for entry in entries(payload)? {
            // Aliases come back as extra values; the canonical principal is first.
            let name = attribute(&entry, "krbprincipalname")
                .into_first_string("krbprincipalname")?
                .filter(|name| !name.is_empty())
                .ok_or_else(|| NormalizeError::MissingName {
                    attribute: "krbprincipalname".to_string(),
                })?;
            services.push(Instance::present(name, ServiceProps {}));
        }
        debug!(count = services.len(), "Read services");
        Ok(index(services))
    }

    async fn write(
        &self,
        scope: &mut Scope<'_>,
        transition: Transition,
        desired: &Desired<ServiceProps>,
        _cached: &Instance<ServiceProps>,
    ) -> Result<()> {
        if transition == Transition::Modify {
            return Ok(());
        }
        scope
            .call(&entity_call("service", transition, &desired.name))
            .await?;
        Ok(())
    }
}
