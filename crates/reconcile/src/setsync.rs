//! Set reconciliation for naturally-keyed memberships.
//!
//! Used where a resource owns a set of child associations that the API
//! manages one at a time (firewall device attachments).

use anyhow::Result;
use std::collections::BTreeSet;

/// Items to remove and add to move from one set to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDelta<T> {
    /// `prior - desired`, in key order
    pub to_remove: Vec<T>,
    /// `desired - prior`, in key order
    pub to_add: Vec<T>,
}

impl<T: Ord + Clone> SetDelta<T> {
    /// Compute the delta between two sets.
    pub fn between<'a>(
        prior: impl IntoIterator<Item = &'a T>,
        desired: impl IntoIterator<Item = &'a T>,
    ) -> Self
    where
        T: 'a,
    {
        let prior: BTreeSet<&T> = prior.into_iter().collect();
        let desired: BTreeSet<&T> = desired.into_iter().collect();
        Self {
            to_remove: prior.difference(&desired).map(|t| (*t).clone()).collect(),
            to_add: desired.difference(&prior).map(|t| (*t).clone()).collect(),
        }
    }
}

impl<T> SetDelta<T> {
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

/// Apply a delta: every removal first, then every addition.
///
/// Stops at the first error. Steps already completed are not rolled back;
/// the next read reports the real membership.
pub fn reconcile_set<T, R, A>(delta: &SetDelta<T>, mut remove: R, mut add: A) -> Result<()>
where
    R: FnMut(&T) -> Result<()>,
    A: FnMut(&T) -> Result<()>,
{
    for item in &delta.to_remove {
        remove(item)?;
    }
    for item in &delta.to_add {
        add(item)?;
    }
    Ok(())
}
