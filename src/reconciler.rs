//! Generic reconciler
//!
//! One [`Reconciler`] converges one desired entity. The orchestrator drives it
//! through a fixed sequence:
//!
//! ```text
//! exists ──► create | destroy | sync_properties ──► flush
//!   │                                                 │
//!   └── read_one (cached per run) ◄───────────────────┘ read_one (fresh)
//! ```
//!
//! `exists` seeds the property hash from the cached instance. The mutating
//! steps only edit the property hash. `flush` compares the hash against the
//! cached instance, issues at most one write transition through the
//! [`Provider`], then re-reads the entity so the hash reflects the directory.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::Connection;
use crate::context::{RunContext, Scope};
use crate::error::{ReconcileError, Result};
use crate::model::{lookup, Desired, Ensure, Instance, InstanceTable, Properties};

/// Write issued by `flush`, decided by the cached and final `ensure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Add,
    Modify,
    Delete,
}

impl Transition {
    /// `None` when the entity is and stays absent.
    pub fn between(before: Ensure, after: Ensure) -> Option<Self> {
        match (before, after) {
            (Ensure::Absent, Ensure::Present) => Some(Self::Add),
            (Ensure::Present, Ensure::Present) => Some(Self::Modify),
            (Ensure::Present, Ensure::Absent) => Some(Self::Delete),
            (Ensure::Absent, Ensure::Absent) => None,
        }
    }
}

/// Per-kind directory access.
#[async_trait]
pub trait Provider: Send + Sync {
    type Props: Properties;

    /// Resource kind name; also the instance-table cache key.
    fn kind(&self) -> &'static str;

    /// Every entity of this kind, keyed by namevar.
    async fn read_all(&self, scope: &mut Scope<'_>) -> Result<InstanceTable<Self::Props>>;

    /// The entity matching `desired`, or the absent sentinel.
    ///
    /// `fresh` bypasses the run cache; used after a write.
    async fn read_one(
        &self,
        scope: &mut Scope<'_>,
        desired: &Desired<Self::Props>,
        fresh: bool,
    ) -> Result<Instance<Self::Props>> {
        read_from_table(self, scope, desired, fresh).await
    }

    /// Issue the directory calls for one transition.
    ///
    /// `cached` is the instance as first read this run; `desired` carries the
    /// caller's managed fields.
    async fn write(
        &self,
        scope: &mut Scope<'_>,
        transition: Transition,
        desired: &Desired<Self::Props>,
        cached: &Instance<Self::Props>,
    ) -> Result<()>;
}

/// Default single-entity read: look the name up in the kind's instance table.
///
/// The table is read once per run and cached. A fresh read goes straight to
/// `read_all` and does not touch the cache.
pub async fn read_from_table<P: Provider + ?Sized>(
    provider: &P,
    scope: &mut Scope<'_>,
    desired: &Desired<P::Props>,
    fresh: bool,
) -> Result<Instance<P::Props>> {
    let kind = provider.kind();

    if fresh {
        let table = provider.read_all(scope).await?;
        return Ok(lookup(&table, &desired.name));
    }

    if let Some(table) = scope.context().instance_table::<P::Props>(kind) {
        return Ok(lookup(table, &desired.name));
    }

    let table = provider.read_all(scope).await?;
    let instance = lookup(&table, &desired.name);
    scope.context().store_instance_table(kind, table);
    Ok(instance)
}

/// Drives one desired entity towards its target state.
pub struct Reconciler<P: Provider> {
    provider: P,
    connection: Connection,
    cached: Option<Instance<P::Props>>,
    property_hash: Option<Instance<P::Props>>,
}

impl<P: Provider> Reconciler<P> {
    pub fn new(provider: P, connection: Connection) -> Self {
        Self {
            provider,
            connection,
            cached: None,
            property_hash: None,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Working copy edited by `create`, `destroy` and `sync_properties`, and
    /// replaced by `flush` with what the directory reports afterwards.
    pub fn property_hash(&self) -> Option<&Instance<P::Props>> {
        self.property_hash.as_ref()
    }

    /// Instance as first read this run.
    pub fn cached(&self) -> Option<&Instance<P::Props>> {
        self.cached.as_ref()
    }

    /// Whether the entity exists. Seeds the property hash.
    pub async fn exists(
        &mut self,
        ctx: &mut RunContext,
        desired: &Desired<P::Props>,
    ) -> Result<bool> {
        if desired.ensure == Ensure::Present {
            let kind = self.provider.kind();
            desired
                .props
                .validate()
                .map_err(|message| ReconcileError::invalid(kind, &desired.name, message))?;
        }

        let instance = self.cached_instance(ctx, desired).await?;
        let present = instance.is_present();
        debug!(kind = self.provider.kind(), name = %desired.name, present, "Checked existence");
        self.property_hash = Some(instance);
        Ok(present)
    }

    pub fn create(&mut self, desired: &Desired<P::Props>) {
        self.hash_mut(desired).ensure = Ensure::Present;
    }

    pub fn destroy(&mut self, desired: &Desired<P::Props>) {
        self.hash_mut(desired).ensure = Ensure::Absent;
    }

    /// Apply every managed property of `desired` to the property hash.
    /// Returns the names of the properties that differed.
    pub fn sync_properties(&mut self, desired: &Desired<P::Props>) -> Vec<&'static str> {
        self.hash_mut(desired).props.sync_from(&desired.props)
    }

    /// Issue the write implied by the property hash, then refresh it.
    pub async fn flush(&mut self, ctx: &mut RunContext, desired: &Desired<P::Props>) -> Result<()> {
        let cached = self.cached_instance(ctx, desired).await?;
        let target = self
            .property_hash
            .as_ref()
            .map_or(cached.ensure, |hash| hash.ensure);

        let mut scope = Scope::new(ctx, &self.connection);
        match Transition::between(cached.ensure, target) {
            Some(transition) => {
                info!(
                    kind = self.provider.kind(),
                    name = %desired.name,
                    ?transition,
                    "Writing to directory"
                );
                self.provider
                    .write(&mut scope, transition, desired, &cached)
                    .await?;
            }
            None => {
                debug!(kind = self.provider.kind(), name = %desired.name, "Nothing to write");
            }
        }

        let refreshed = self.provider.read_one(&mut scope, desired, true).await?;
        self.property_hash = Some(refreshed);
        Ok(())
    }

    async fn cached_instance(
        &mut self,
        ctx: &mut RunContext,
        desired: &Desired<P::Props>,
    ) -> Result<Instance<P::Props>> {
        if let Some(instance) = &self.cached {
            return Ok(instance.clone());
        }
        let mut scope = Scope::new(ctx, &self.connection);
        let instance = self.provider.read_one(&mut scope, desired, false).await?;
        self.cached = Some(instance.clone());
        Ok(instance)
    }

    fn hash_mut(&mut self, desired: &Desired<P::Props>) -> &mut Instance<P::Props> {
        let cached = self.cached.clone();
        self.property_hash
            .get_or_insert_with(|| cached.unwrap_or_else(|| Instance::absent(&desired.name)))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{connection, MemoryProvider, NoteProps};
    use super::*;

    fn note(name: &str, text: &str) -> Desired<NoteProps> {
        Desired::present(
            name,
            NoteProps {
                note: Some(text.to_string()),
            },
        )
    }

    #[test]
    fn transitions_follow_ensure_pairs() {
        use Ensure::*;
        assert_eq!(Transition::between(Absent, Present), Some(Transition::Add));
        assert_eq!(Transition::between(Present, Present), Some(Transition::Modify));
        assert_eq!(Transition::between(Present, Absent), Some(Transition::Delete));
        assert_eq!(Transition::between(Absent, Absent), None);
    }

    #[tokio::test]
    async fn create_then_flush_adds_and_refreshes() {
        let provider = MemoryProvider::default();
        let mut ctx = RunContext::new();
        let mut reconciler = Reconciler::new(provider.clone(), connection());
        let desired = note("bob", "hello");

        assert!(!reconciler.exists(&mut ctx, &desired).await.unwrap());
        reconciler.create(&desired);
        reconciler.sync_properties(&desired);
        reconciler.flush(&mut ctx, &desired).await.unwrap();

        assert_eq!(provider.writes(), vec![(Transition::Add, "bob".to_string())]);
        let hash = reconciler.property_hash().unwrap();
        assert!(hash.is_present());
        assert_eq!(hash.props.note.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn sync_reports_only_differences() {
        let provider = MemoryProvider::with(&[("bob", "old")]);
        let mut ctx = RunContext::new();
        let mut reconciler = Reconciler::new(provider.clone(), connection());

        assert!(reconciler.exists(&mut ctx, &note("bob", "old")).await.unwrap());
        assert!(reconciler.sync_properties(&note("bob", "old")).is_empty());
        assert_eq!(reconciler.sync_properties(&note("bob", "new")), vec!["note"]);
    }

    #[tokio::test]
    async fn absent_to_absent_never_writes() {
        let provider = MemoryProvider::default();
        let mut ctx = RunContext::new();
        let mut reconciler = Reconciler::new(provider.clone(), connection());
        let desired = Desired::<NoteProps>::absent("ghost");

        assert!(!reconciler.exists(&mut ctx, &desired).await.unwrap());
        reconciler.destroy(&desired);
        reconciler.flush(&mut ctx, &desired).await.unwrap();

        assert!(provider.writes().is_empty());
        assert!(!reconciler.property_hash().unwrap().is_present());
    }

    #[tokio::test]
    async fn destroy_issues_delete() {
        let provider = MemoryProvider::with(&[("bob", "x")]);
        let mut ctx = RunContext::new();
        let mut reconciler = Reconciler::new(provider.clone(), connection());
        let desired = Desired::<NoteProps>::absent("bob");

        assert!(reconciler.exists(&mut ctx, &desired).await.unwrap());
        reconciler.destroy(&desired);
        reconciler.flush(&mut ctx, &desired).await.unwrap();

        assert_eq!(provider.writes(), vec![(Transition::Delete, "bob".to_string())]);
        assert!(!reconciler.property_hash().unwrap().is_present());
    }

    #[tokio::test]
    async fn instance_table_is_read_once_per_run() {
        let provider = MemoryProvider::with(&[("a", "1"), ("b", "2")]);
        let mut ctx = RunContext::new();

        for name in ["a", "b", "c"] {
            let mut reconciler = Reconciler::new(provider.clone(), connection());
            reconciler.exists(&mut ctx, &note(name, "1")).await.unwrap();
        }
        assert_eq!(provider.reads(), 1);

        let mut next_run = RunContext::new();
        let mut reconciler = Reconciler::new(provider.clone(), connection());
        reconciler.exists(&mut next_run, &note("a", "1")).await.unwrap();
        assert_eq!(provider.reads(), 2);
    }

    #[tokio::test]
    async fn flush_rereads_bypassing_cache() {
        let provider = MemoryProvider::with(&[("bob", "old")]);
        let mut ctx = RunContext::new();
        let mut reconciler = Reconciler::new(provider.clone(), connection());
        let desired = note("bob", "new");

        reconciler.exists(&mut ctx, &desired).await.unwrap();
        reconciler.sync_properties(&desired);
        reconciler.flush(&mut ctx, &desired).await.unwrap();

        assert_eq!(provider.reads(), 2);
        assert_eq!(
            reconciler.property_hash().unwrap().props.note.as_deref(),
            Some("new")
        );
        assert_eq!(
            reconciler.cached().unwrap().props.note.as_deref(),
            Some("old")
        );
    }

    #[tokio::test]
    async fn invalid_desired_state_is_rejected_before_reading() {
        let provider = MemoryProvider::default();
        let mut ctx = RunContext::new();
        let mut reconciler = Reconciler::new(provider.clone(), connection());

        let err = reconciler
            .exists(&mut ctx, &note("bob", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidDesired { .. }));
        assert_eq!(provider.reads(), 0);
    }
}
