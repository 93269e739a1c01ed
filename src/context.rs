//! Run-scoped state
//!
//! One [`RunContext`] lives for one convergence run. It owns the two caches
//! every resource shares: authenticated sessions (keyed by endpoint and
//! principal) and instance tables (keyed by resource kind). Dropping the
//! context discards both, so nothing leaks from one run into the next.
//!
//! The run is serial. Holding `&mut RunContext` is what makes a cache fill
//! single-flight: nothing else can observe the miss while it is being filled.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use ipa_client::{RpcRequest, SessionClient};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Connection;
use crate::error::Result;
use crate::model::InstanceTable;

#[derive(Default)]
pub struct RunContext {
    clients: HashMap<String, Arc<SessionClient>>,
    tables: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticated session for `connection`, logging in on first use.
    pub async fn client(&mut self, connection: &Connection) -> Result<Arc<SessionClient>> {
        let key = connection.cache_key();
        if let Some(client) = self.clients.get(&key) {
            return Ok(Arc::clone(client));
        }

        info!(
            api_url = %connection.api_url,
            username = %connection.username,
            "Opening IPA session"
        );
        let client = SessionClient::login(
            &connection.api_url,
            &connection.username,
            connection.password.expose(),
            &connection.http,
        )
        .await?;

        let client = Arc::new(client);
        self.clients.insert(key, Arc::clone(&client));
        Ok(client)
    }

    pub fn session_count(&self) -> usize {
        self.clients.len()
    }

    /// Cached bulk read of `kind`, if one has been stored this run.
    pub fn instance_table<P: Send + Sync + 'static>(&self, kind: &str) -> Option<&InstanceTable<P>> {
        self.tables
            .get(kind)
            .and_then(|table| table.downcast_ref::<InstanceTable<P>>())
    }

    pub fn has_instance_table(&self, kind: &str) -> bool {
        self.tables.contains_key(kind)
    }

    /// Store a bulk read. Callers only store on a miss; a stored table is
    /// never replaced during the run.
    pub fn store_instance_table<P: Send + Sync + 'static>(
        &mut self,
        kind: &'static str,
        table: InstanceTable<P>,
    ) {
        debug!(kind, entries = table.len(), "Caching instance table");
        self.tables.entry(kind).or_insert_with(|| Box::new(table));
    }
}

/// A run context bound to the connection of the resource being converged.
pub struct Scope<'a> {
    ctx: &'a mut RunContext,
    connection: &'a Connection,
}

impl<'a> Scope<'a> {
    pub fn new(ctx: &'a mut RunContext, connection: &'a Connection) -> Self {
        Self { ctx, connection }
    }

    pub fn connection(&self) -> &Connection {
        self.connection
    }

    pub fn context(&mut self) -> &mut RunContext {
        self.ctx
    }

    /// Issue one JSON-RPC call and return `result.result`.
    pub async fn call(&mut self, request: &RpcRequest) -> Result<Value> {
        let client = self.ctx.client(self.connection).await?;
        debug!(method = %request.method, "IPA call");
        Ok(client.call_payload(request).await?)
    }
}
