//! # Reconcile
//!
//! The plan/apply core of the Linode provider.
//!
//! Resources are described by typed attribute models. Plans are computed
//! generically from a prior state and a configuration, with per-attribute
//! semantic equality so that equivalent spellings never produce drift.
//! Reconcilers perform the cloud I/O for create, read, update and delete.
//!
//! ## Core Concepts
//!
//! - **Schema / Attribute**: the model of a resource type, including which
//!   attributes are required, computed, or force replacement
//! - **Value / State**: attribute values, where `Unknown` means "known only
//!   after apply"
//! - **Plan / ChangeSet**: the per-attribute classification of a change
//! - **Reconciler**: the trait each resource type implements
//! - **EventWaiter**: completion of asynchronous operations via account events
//! - **FilterConfig / DataSource**: filtered list lookups with a synthetic ID
//! - **HostAdapter**: the JSON surface the host drives
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{HostAdapter, CancelToken};
//!
//! let mut adapter = HostAdapter::new();
//! adapter.register(Arc::new(DomainReconciler::new(meta.clone())));
//!
//! let cancel = CancelToken::new();
//! let plan = adapter.plan(&cancel, "linode_domain", None, Some(&config));
//! let applied = adapter.apply(&cancel, "linode_domain", None, plan.state.as_ref(), &mut |s| {
//!     save_partial(s);
//! });
//! ```

#![warn(clippy::all)]

pub mod adapter;
pub mod context;
pub mod datasource;
pub mod diagnostics;
pub mod diff;
pub mod model;
pub mod resource;
pub mod semantic;
pub mod setsync;
pub mod value;
pub mod waiter;

pub use adapter::{HostAdapter, Response, UNKNOWN_MARKER};
pub use context::ApplyContext;
pub use datasource::{DataSource, FilterConfig, FilterField, FilterSpec, MatchBy, Query};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use diff::{Action, Change, ChangeSet, Plan};
pub use linode_api::CancelToken;
pub use model::{Attribute, Presence, Schema, Validator};
pub use resource::{ReadOutcome, Reconciler};
pub use semantic::{Equality, SemanticEq};
pub use setsync::{SetDelta, reconcile_set};
pub use value::{Kind, State, Value, ValueError};
pub use waiter::{EventWaiter, WaitError};
