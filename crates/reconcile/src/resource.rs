//! The reconciler trait: how one resource type converges.
//!
//! A reconciler owns the mapping between a resource's attribute model and
//! the cloud API. The plan is computed generically by [`crate::diff::plan`];
//! the reconciler only performs I/O.

use crate::context::ApplyContext;
use crate::diagnostics::Diagnostics;
use crate::diff::{ChangeSet, Plan};
use crate::model::Schema;
use crate::value::State;
use anyhow::Result;
use std::fmt;

/// Result of reading a resource from the cloud.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// The resource exists; its current state.
    Found(State),
    /// The resource no longer exists and should be removed from state.
    Gone,
}

impl ReadOutcome {
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Gone)
    }

    pub fn into_state(self) -> Option<State> {
        match self {
            Self::Found(state) => Some(state),
            Self::Gone => None,
        }
    }
}

/// Core trait for managed cloud resources.
///
/// # Example
///
/// ```ignore
/// impl Reconciler for DomainReconciler {
///     fn type_name(&self) -> &'static str { "linode_domain" }
///     fn model(&self) -> &Schema { &self.schema }
///
///     fn create(&self, ctx: &mut ApplyContext, planned: &State) -> Result<State> {
///         let domain = self.client.create_domain(&ctx.cancel, &expand(planned)?)?;
///         let state = flatten(&domain);
///         ctx.checkpoint(&state);
///         Ok(state)
///     }
///     // read, update, delete ...
/// }
/// ```
pub trait Reconciler: Send + Sync + fmt::Debug {
    /// Resource type name, e.g. `linode_domain`
    fn type_name(&self) -> &'static str;

    /// The attribute model
    fn model(&self) -> &Schema;

    /// Cross-attribute validation of a configuration.
    ///
    /// Runs after the generic checks (required attributes, validators).
    fn validate(&self, _config: &State, _diags: &mut Diagnostics) {}

    /// Adjust a computed plan before it is returned to the host.
    ///
    /// Runs only when the resource is planned to exist afterwards.
    fn modify_plan(
        &self,
        _ctx: &mut ApplyContext,
        _prior: Option<&State>,
        _plan: &mut Plan,
    ) -> Result<()> {
        Ok(())
    }

    /// Create the resource and return its full state.
    ///
    /// Must call [`ApplyContext::checkpoint`] as soon as an ID is known.
    fn create(&self, ctx: &mut ApplyContext, planned: &State) -> Result<State>;

    /// Read the current state. A 404 is [`ReadOutcome::Gone`], not an error.
    fn read(&self, ctx: &mut ApplyContext, prior: &State) -> Result<ReadOutcome>;

    /// Update in place.
    ///
    /// Implementations return `prior` untouched, without any API call, when
    /// `changes` has no update.
    fn update(
        &self,
        ctx: &mut ApplyContext,
        prior: &State,
        planned: &State,
        changes: &ChangeSet,
    ) -> Result<State>;

    /// Delete the resource. A 404 counts as success.
    fn delete(&self, ctx: &mut ApplyContext, prior: &State) -> Result<()>;

    /// Import an existing resource by its import ID.
    ///
    /// The default seeds `id` and reads.
    fn import(&self, ctx: &mut ApplyContext, id: &str) -> Result<ReadOutcome> {
        let seed = State::new().with("id", id);
        self.read(ctx, &seed)
    }
}

/// Split a composite import ID such as `"12,34"` into its numeric parts.
pub fn parse_import_id(id: &str, parts: &[&str]) -> Result<Vec<String>> {
    let pieces: Vec<&str> = id.split(',').map(str::trim).collect();
    if pieces.len() != parts.len() || pieces.iter().any(|p| p.is_empty()) {
        anyhow::bail!(
            "invalid import ID {id:?}: expected {}",
            parts
                .iter()
                .map(|p| format!("<{p}>"))
                .collect::<Vec<_>>()
                .join(",")
        );
    }
    Ok(pieces.into_iter().map(ToString::to_string).collect())
}

/// Parse a decimal ID, naming the field on failure.
pub fn parse_id(raw: &str, what: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid {what} {raw:?}: expected a number"))
}
