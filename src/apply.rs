//! Serial driver
//!
//! Applies a manifest resource by resource, in the order given. Each entity
//! runs the full reconciler sequence before the next one starts, and a
//! failure is recorded against that entity without stopping the run. One
//! [`RunContext`] is shared across the run, so every resource reuses the same
//! session and each kind's instance table is read at most once.

use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::Connection;
use crate::context::{RunContext, Scope};
use crate::error::{ReconcileError, Result};
use crate::manifest::{Manifest, ResourceKind, ResourceSpec};
use crate::model::{Desired, Ensure};
use crate::providers::{
    DnsZoneProvider, GroupMembershipProvider, GroupProvider, KinitProvider, ServiceProvider,
    SystemCommandRunner, UserProvider,
};
use crate::reconciler::{Provider, Reconciler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Unchanged,
    Created,
    Updated,
    Destroyed,
}

/// What converging one entity did, or would do under `noop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub action: Action,
    /// Properties that differed from the directory.
    pub changes: Vec<&'static str>,
    /// Whether the write was actually issued.
    pub flushed: bool,
}

/// Run one entity through `exists`, then `create` / `destroy` /
/// `sync_properties`, then `flush` when anything changed.
pub async fn converge<P: Provider>(
    ctx: &mut RunContext,
    reconciler: &mut Reconciler<P>,
    desired: &Desired<P::Props>,
    noop: bool,
) -> Result<Outcome> {
    let kind = reconciler.provider().kind();
    let exists = reconciler.exists(ctx, desired).await?;

    let (action, changes) = match (exists, desired.ensure) {
        (false, Ensure::Present) => {
            reconciler.create(desired);
            (Action::Created, reconciler.sync_properties(desired))
        }
        (true, Ensure::Absent) => {
            reconciler.destroy(desired);
            (Action::Destroyed, Vec::new())
        }
        (true, Ensure::Present) => {
            let changes = reconciler.sync_properties(desired);
            let action = if changes.is_empty() {
                Action::Unchanged
            } else {
                Action::Updated
            };
            (action, changes)
        }
        (false, Ensure::Absent) => (Action::Unchanged, Vec::new()),
    };

    if action == Action::Unchanged {
        debug!(kind, name = %desired.name, "In sync");
        return Ok(Outcome {
            action,
            changes,
            flushed: false,
        });
    }

    if noop {
        info!(kind, name = %desired.name, ?action, ?changes, "Would change (noop)");
        return Ok(Outcome {
            action,
            changes,
            flushed: false,
        });
    }

    reconciler.flush(ctx, desired).await?;
    info!(kind, name = %desired.name, ?action, ?changes, "Converged");
    Ok(Outcome {
        action,
        changes,
        flushed: true,
    })
}

async fn converge_with<P: Provider>(
    ctx: &mut RunContext,
    provider: P,
    connection: &Connection,
    desired: &Desired<P::Props>,
    noop: bool,
) -> Result<Outcome> {
    let mut reconciler = Reconciler::new(provider, connection.clone());
    converge(ctx, &mut reconciler, desired, noop).await
}

/// Converge one manifest resource with the matching provider.
pub async fn apply_resource(
    ctx: &mut RunContext,
    connection: &Connection,
    resource: &ResourceSpec,
    noop: bool,
) -> Result<Outcome> {
    match resource {
        ResourceSpec::User(d) => converge_with(ctx, UserProvider, connection, d, noop).await,
        ResourceSpec::Group(d) => converge_with(ctx, GroupProvider, connection, d, noop).await,
        ResourceSpec::GroupMembership(d) => {
            converge_with(ctx, GroupMembershipProvider, connection, d, noop).await
        }
        ResourceSpec::Service(d) => converge_with(ctx, ServiceProvider, connection, d, noop).await,
        ResourceSpec::DnsZone(d) => converge_with(ctx, DnsZoneProvider, connection, d, noop).await,
        ResourceSpec::Kinit(d) => {
            converge_with(ctx, KinitProvider::new(SystemCommandRunner), connection, d, noop).await
        }
    }
}

#[derive(Debug)]
pub struct EntityReport {
    pub kind: ResourceKind,
    pub name: String,
    pub outcome: std::result::Result<Outcome, ReconcileError>,
}

#[derive(Debug, Default)]
pub struct ApplyReport {
    pub entities: Vec<EntityReport>,
}

impl ApplyReport {
    pub fn failed(&self) -> usize {
        self.entities.iter().filter(|e| e.outcome.is_err()).count()
    }

    pub fn changed(&self) -> usize {
        self.entities
            .iter()
            .filter(|e| matches!(&e.outcome, Ok(o) if o.action != Action::Unchanged))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Apply `resources` in order against one connection.
pub async fn apply(connection: &Connection, resources: &[ResourceSpec], noop: bool) -> ApplyReport {
    let mut ctx = RunContext::new();
    let mut report = ApplyReport::default();

    for resource in resources {
        let kind = resource.kind();
        let name = resource.name().to_string();
        let outcome = apply_resource(&mut ctx, connection, resource, noop).await;
        if let Err(err) = &outcome {
            error!(kind = %kind, name = %name, error = %err, "Failed to converge");
        }
        report.entities.push(EntityReport {
            kind,
            name,
            outcome,
        });
    }

    info!(
        total = report.entities.len(),
        changed = report.changed(),
        failed = report.failed(),
        noop,
        "Apply finished"
    );
    report
}

/// Resolve the manifest's connection and apply its resources.
pub async fn apply_manifest(manifest: &Manifest, noop: bool) -> Result<ApplyReport> {
    let connection = manifest.connection.clone().resolve()?;
    Ok(apply(&connection, &manifest.resources, noop).await)
}

async fn dump<P>(provider: P, ctx: &mut RunContext, connection: &Connection) -> Result<String>
where
    P: Provider,
    P::Props: Serialize,
{
    let mut scope = Scope::new(ctx, connection);
    let table = provider.read_all(&mut scope).await?;
    let instances: Vec<_> = table.values().collect();
    Ok(serde_yaml::to_string(&instances)?)
}

/// Every instance of `kind` as a YAML list.
pub async fn list_kind(connection: &Connection, kind: ResourceKind) -> Result<String> {
    let mut ctx = RunContext::new();
    match kind {
        ResourceKind::User => dump(UserProvider, &mut ctx, connection).await,
        ResourceKind::Group => dump(GroupProvider, &mut ctx, connection).await,
        ResourceKind::GroupMembership => dump(GroupMembershipProvider, &mut ctx, connection).await,
        ResourceKind::Service => dump(ServiceProvider, &mut ctx, connection).await,
        ResourceKind::DnsZone => dump(DnsZoneProvider, &mut ctx, connection).await,
        ResourceKind::Kinit => {
            dump(KinitProvider::new(SystemCommandRunner), &mut ctx, connection).await
        }
    }
}
