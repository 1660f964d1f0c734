//! Server-side filter expressions sent in the `X-Filter` header.
//!
//! The Linode API accepts a JSON object of field equalities, combinators
//! (`+and`, `+or`) and ordering hints (`+order_by`, `+order`).
//!
//! ```
//! use linode_api::filter::{Filter, Order};
//!
//! let filter = Filter::new()
//!     .eq("seen", false)
//!     .order_by("created", Order::Desc);
//! assert_eq!(
//!     filter.to_header(),
//!     r#"{"+order":"desc","+order_by":"created","seen":false}"#
//! );
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;

/// Sort direction for ordered listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

impl Order {
    /// The API spelling of this direction.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("invalid order {other:?}, expected \"asc\" or \"desc\"")),
        }
    }
}

/// A server-side filter expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    root: Map<String, Value>,
}

impl Filter {
    /// An empty filter (matches everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.root.insert(field.into(), value.into());
        self
    }

    /// Sort by `field` in `order`.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, order: Order) -> Self {
        self.root
            .insert("+order_by".to_string(), Value::String(field.into()));
        self.root
            .insert("+order".to_string(), Value::String(order.as_str().to_string()));
        self
    }

    /// Conjunction of disjunctions: each group matches when any of its
    /// `(field, value)` pairs matches.
    ///
    /// This is the shape `{"+and": [{"+or": [{f: v}, ...]}, ...]}`.
    #[must_use]
    pub fn all_of_any<I, G, K, V>(groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let and: Vec<Value> = groups
            .into_iter()
            .map(|group| {
                let or: Vec<Value> = group
                    .into_iter()
                    .map(|(k, v)| {
                        let mut m = Map::new();
                        m.insert(k.into(), v.into());
                        Value::Object(m)
                    })
                    .collect();
                json!({ "+or": or })
            })
            .collect();
        let mut root = Map::new();
        root.insert("+and".to_string(), Value::Array(and));
        Self { root }
    }

    /// Whether the filter has no clauses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// The filter as a JSON value.
    #[must_use]
    pub fn as_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Serialize for the `X-Filter` header.
    #[must_use]
    pub fn to_header(&self) -> String {
        Value::Object(self.root.clone()).to_string()
    }

    /// Evaluate the equality clauses against a JSON entity.
    ///
    /// Used by the in-memory client to honor filters; ordering hints are
    /// ignored here. A string filter value matches any element of an array
    /// field, mirroring how the API filters on `tags`.
    #[must_use]
    pub fn matches(&self, entity: &Value) -> bool {
        self.root.iter().all(|(key, expected)| match key.as_str() {
            "+order_by" | "+order" => true,
            "+and" => expected
                .as_array()
                .is_none_or(|clauses| clauses.iter().all(|c| clause_matches(c, entity))),
            "+or" => expected
                .as_array()
                .is_none_or(|clauses| clauses.iter().any(|c| clause_matches(c, entity))),
            field => field_matches(entity.get(field), expected),
        })
    }

    /// The ordering hint, if any.
    #[must_use]
    pub fn ordering(&self) -> Option<(&str, Order)> {
        let field = self.root.get("+order_by")?.as_str()?;
        let order = self
            .root
            .get("+order")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        Some((field, order))
    }
}

fn clause_matches(clause: &Value, entity: &Value) -> bool {
    match clause {
        Value::Object(map) => Filter { root: map.clone() }.matches(entity),
        _ => false,
    }
}

fn field_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(Value::Array(items)) => items.iter().any(|item| scalar_eq(item, expected)),
        Some(value) => scalar_eq(value, expected),
        None => expected.is_null(),
    }
}

fn scalar_eq(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    // The API compares numbers against their string form.
    match (actual, expected) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        _ => false,
    }
}
