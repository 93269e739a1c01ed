//! ipa-converge - FreeIPA Directory Convergence
//!
//! Reconciles a desired description of directory objects (users, groups,
//! group memberships, services, DNS zones, Kerberos tickets) against what a
//! FreeIPA server reports, and issues the smallest set of writes that makes
//! the two agree.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Manifest (YAML) ──► apply / list driver                        │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Reconciler<P: Provider>                       │
//! │     exists → create | destroy | sync_properties → flush         │
//! └─────────────────────────────────────────────────────────────────┘
//!                │                                  │
//!                ▼                                  ▼
//! ┌───────────────────────────────┐  ┌──────────────────────────────┐
//! │ Providers (user, group, ...)  │  │ RunContext                   │
//! │  normalize + list diffing     │  │  sessions, instance tables   │
//! └───────────────────────────────┘  └──────────────────────────────┘
//!                │                                  │
//!                ▼                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          ipa-client: session login, JSON-RPC, redirects         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ipa_converge::{apply, Connection, Manifest};
//!
//! let manifest = Manifest::load("site.yaml")?;
//! let connection = manifest.connection.clone().resolve()?;
//! let report = apply(&connection, &manifest.resources, false).await;
//! assert!(report.is_success());
//! ```

pub mod apply;
pub mod config;
pub mod context;
pub mod error;
pub mod list;
pub mod manifest;
pub mod model;
pub mod normalize;
pub mod providers;
pub mod reconciler;

// Re-export main types
pub use apply::{
    apply, apply_manifest, apply_resource, converge, list_kind, Action, ApplyReport, Outcome,
};
pub use config::{Connection, ConnectionSpec, Secret};
pub use context::{RunContext, Scope};
pub use error::{ReconcileError, Result};
pub use list::MembershipMode;
pub use manifest::{Manifest, ResourceKind, ResourceSpec};
pub use model::{Desired, Ensure, Instance, InstanceTable, Properties};
pub use normalize::{AttrValue, NormalizeError};
pub use reconciler::{Provider, Reconciler, Transition};
