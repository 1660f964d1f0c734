//! Plan computation: compare prior state with desired configuration.
//!
//! The differ is pure: it never talks to the cloud, and equal inputs always
//! produce equal plans.

use crate::diagnostics::Diagnostics;
use crate::model::{Attribute, Schema};
use crate::semantic::Equality;
use crate::value::{State, Value};
use serde::Serialize;
use std::collections::BTreeMap;

/// How one attribute changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    Unchanged,
    /// Updated in place.
    Update,
    /// Changing it forces a replacement.
    Replace,
    /// Value will be known after apply.
    Compute,
}

/// What apply will do with the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    /// Delete, then create.
    Replace,
    NoOp,
    Delete,
}

/// Per-attribute classification plus the overall action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub action: Action,
    pub attributes: BTreeMap<String, Change>,
}

impl ChangeSet {
    fn new(action: Action) -> Self {
        Self {
            action,
            attributes: BTreeMap::new(),
        }
    }

    /// The change for `name`; unlisted attributes are unchanged.
    pub fn change(&self, name: &str) -> Change {
        self.attributes
            .get(name)
            .copied()
            .unwrap_or(Change::Unchanged)
    }

    /// Whether `name` changes in any way.
    pub fn changed(&self, name: &str) -> bool {
        self.change(name) != Change::Unchanged
    }

    /// Whether any of `names` changes.
    pub fn any_changed(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.changed(name))
    }

    /// Whether any attribute is updated in place or recomputed.
    pub fn any_update(&self) -> bool {
        self.attributes
            .values()
            .any(|c| matches!(c, Change::Update | Change::Compute))
    }

    /// Whether any attribute forces a replacement.
    pub fn any_replace(&self) -> bool {
        self.attributes.values().any(|c| *c == Change::Replace)
    }

    /// Attributes that force a replacement.
    pub fn replaced(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|(_, c)| **c == Change::Replace)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// The result of planning.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Planned state; `None` when the resource is to be deleted.
    pub planned: Option<State>,
    pub changes: ChangeSet,
    pub diagnostics: Diagnostics,
}

impl Plan {
    /// Keep the prior value of `name`, marking it unchanged.
    ///
    /// Used by plan hooks that know two values are equivalent in ways the
    /// model cannot express.
    pub fn suppress(&mut self, name: &str, prior: &State) {
        if let Some(planned) = &mut self.planned {
            planned.set(name, prior.get(name).clone());
        }
        self.changes
            .attributes
            .insert(name.to_string(), Change::Unchanged);
        if self.changes.action == Action::Update && !self.changes.any_update() {
            self.changes.action = Action::NoOp;
        }
    }
}

/// Compare two values of an attribute, honoring its semantic predicate and
/// the predicates of nested object fields.
pub fn compare_values(attr: &Attribute, prior: &Value, planned: &Value) -> Equality {
    if prior == planned {
        return Equality::Equal;
    }
    if !attr.is_required() && prior.is_blank() && planned.is_blank() {
        return Equality::Equal;
    }
    if let Some(semantic) = &attr.semantic {
        return semantic.compare(prior, planned);
    }
    if attr.nested.is_empty() {
        return Equality::Different;
    }
    match (prior, planned) {
        (Value::Object(p), Value::Object(n)) => compare_fields(&attr.nested, p, n),
        (Value::List(p), Value::List(n)) if p.len() == n.len() => {
            p.iter().zip(n).fold(Equality::Equal, |acc, (p, n)| {
                let element = match (p, n) {
                    (Value::Object(p), Value::Object(n)) => compare_fields(&attr.nested, p, n),
                    _ if p == n => Equality::Equal,
                    _ => Equality::Different,
                };
                acc.and(element)
            })
        }
        _ => Equality::Different,
    }
}

fn compare_fields(
    nested: &[Attribute],
    prior: &BTreeMap<String, Value>,
    planned: &BTreeMap<String, Value>,
) -> Equality {
    let mut result = Equality::Equal;
    for name in prior.keys().chain(planned.keys()) {
        let p = prior.get(name).unwrap_or(&Value::Null);
        let n = planned.get(name).unwrap_or(&Value::Null);
        let eq = match nested.iter().find(|a| a.name == name) {
            Some(attr) => compare_values(attr, p, n),
            None if p == n => Equality::Equal,
            None => Equality::Different,
        };
        result = result.and(eq);
    }
    result
}

/// Carry `reference`'s spelling of an empty value into `state` where the
/// API answered with the other one, such as null for a configured `[]`.
pub fn preserve_blank(schema: &Schema, reference: &State, state: &mut State) {
    for attr in schema.attributes.iter().filter(|a| a.is_configurable()) {
        let wanted = reference.get(attr.name);
        let actual = state.get(attr.name);
        if wanted != actual && wanted.is_blank() && actual.is_blank() {
            state.set(attr.name, wanted.clone());
        }
    }
}

/// Compute the plan for moving from `prior` to `desired`.
///
/// `prior` is `None` for a resource that does not exist yet; `desired` is
/// `None` when the resource is being removed from configuration.
pub fn plan(schema: &Schema, prior: Option<&State>, desired: Option<&State>) -> Plan {
    let mut diagnostics = Diagnostics::new();

    let Some(desired) = desired else {
        let action = if prior.is_some() {
            Action::Delete
        } else {
            Action::NoOp
        };
        return Plan {
            planned: None,
            changes: ChangeSet::new(action),
            diagnostics,
        };
    };

    let mut planned = State::new();
    let mut changes = ChangeSet::new(Action::NoOp);
    let mut unset_computed = Vec::new();

    for attr in &schema.attributes {
        let configured = if attr.is_configurable() {
            desired.get(attr.name).clone()
        } else {
            Value::Null
        };

        // Resolve what the user did not set.
        let mut value = if !configured.is_null() {
            configured
        } else if let Some(default) = &attr.default {
            default.clone()
        } else if attr.is_computed() {
            unset_computed.push(attr.name);
            prior.map_or(Value::Unknown, |p| p.get(attr.name).clone())
        } else {
            Value::Null
        };

        if let Some(semantic) = &attr.semantic
            && value.is_concrete()
        {
            let (normalized, warning) = semantic.normalize(attr.name, value);
            if let Some(warning) = warning {
                diagnostics.warning_at(attr.name, warning);
            }
            value = normalized;
        }

        let change = match prior {
            None if value.contains_unknown() => Change::Compute,
            None if value.is_null() => Change::Unchanged,
            None => Change::Update,
            Some(_) if value.contains_unknown() => Change::Compute,
            Some(prior) => {
                let old = prior.get(attr.name);
                if compare_values(attr, old, &value).is_equal() {
                    // Keep the configured spelling of an empty value.
                    if !(old.is_blank() && value.is_blank()) {
                        value = old.clone();
                    }
                    Change::Unchanged
                } else if attr.force_replace {
                    Change::Replace
                } else {
                    Change::Update
                }
            }
        };

        planned.set(attr.name, value);
        changes.attributes.insert(attr.name.to_string(), change);
    }

    changes.action = if prior.is_none() {
        Action::Create
    } else if changes.any_replace() {
        for name in unset_computed {
            planned.set(name, Value::Unknown);
            changes.attributes.insert(name.to_string(), Change::Compute);
        }
        Action::Replace
    } else if changes.any_update() {
        Action::Update
    } else {
        Action::NoOp
    };

    Plan {
        planned: Some(planned),
        changes,
        diagnostics,
    }
}
