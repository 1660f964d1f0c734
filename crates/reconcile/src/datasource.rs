//! Filtered, ordered data source lookups.
//!
//! A query is a list of `(name, values, match_by)` predicates plus optional
//! ordering. Exact predicates on fields the API can filter are pushed to the
//! server as an `X-Filter`; everything else is evaluated locally on the
//! flattened results.
//!
//! ```
//! use reconcile::datasource::{FilterConfig, FilterField, FieldType, Query, FilterSpec};
//!
//! let config = FilterConfig::new(vec![
//!     FilterField::api("label", FieldType::String),
//!     FilterField::local("status", FieldType::String),
//! ]);
//! let query = Query {
//!     filters: vec![FilterSpec::exact("label", ["web"])],
//!     ..Default::default()
//! };
//! let filter = config.api_filter(&query).unwrap();
//! assert_eq!(filter.to_header(), r#"{"+and":[{"+or":[{"label":"web"}]}]}"#);
//! ```

use crate::context::ApplyContext;
use crate::diagnostics::Diagnostics;
use crate::model::Schema;
use anyhow::{Context, Result};
use linode_api::{Filter, Order};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// How a predicate compares values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBy {
    Exact,
    Substring,
    Regex,
}

impl FromStr for MatchBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "exact" => Ok(Self::Exact),
            "substring" | "sub" => Ok(Self::Substring),
            "regex" | "re" => Ok(Self::Regex),
            other => Err(format!(
                "invalid match_by {other:?}, expected one of: exact, substring, sub, regex, re"
            )),
        }
    }
}

/// Value type of a filterable field, used to type API filter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Int,
    Bool,
    Float,
}

/// A field that queries may filter or order on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterField {
    pub name: &'static str,
    pub field_type: FieldType,
    /// Exact matches can be sent to the API.
    pub api_filterable: bool,
    /// Ordering is allowed even though the API cannot filter on it.
    pub allow_order_override: bool,
}

impl FilterField {
    /// A field the API can filter on.
    pub const fn api(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            api_filterable: true,
            allow_order_override: false,
        }
    }

    /// A field filtered only on the client side.
    pub const fn local(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            api_filterable: false,
            allow_order_override: false,
        }
    }

    /// Allow `order_by` on this field.
    pub const fn orderable(mut self) -> Self {
        self.allow_order_override = true;
        self
    }

    fn is_orderable(&self) -> bool {
        self.api_filterable || self.allow_order_override
    }

    fn api_value(&self, raw: &str) -> JsonValue {
        match self.field_type {
            FieldType::Int => raw.parse::<i64>().map_or_else(|_| json!(raw), |n| json!(n)),
            FieldType::Bool => raw.parse::<bool>().map_or_else(|_| json!(raw), |b| json!(b)),
            FieldType::Float => raw.parse::<f64>().map_or_else(|_| json!(raw), |f| json!(f)),
            FieldType::String => json!(raw),
        }
    }
}

/// One predicate of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub name: String,
    pub values: Vec<String>,
    #[serde(default = "default_match_by")]
    pub match_by: String,
}

fn default_match_by() -> String {
    "exact".to_string()
}

impl FilterSpec {
    /// An exact-match predicate.
    pub fn exact<S: Into<String>>(name: &str, values: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.to_string(),
            values: values.into_iter().map(Into::into).collect(),
            match_by: default_match_by(),
        }
    }

    /// A predicate with an explicit match mode.
    pub fn matching<S: Into<String>>(
        name: &str,
        values: impl IntoIterator<Item = S>,
        match_by: &str,
    ) -> Self {
        Self {
            match_by: match_by.to_string(),
            ..Self::exact(name, values)
        }
    }

    fn mode(&self) -> Result<MatchBy, String> {
        self.match_by.parse()
    }
}

/// A data source query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default, alias = "filter")]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub order_by: Option<String>,
}

impl Query {
    /// Deterministic ID derived from the query.
    ///
    /// The hex blake3 digest of the canonical JSON of `(filters, order,
    /// order_by)`, so the same query always yields the same ID.
    pub fn synthetic_id(&self) -> String {
        let canonical = json!({
            "filters": self.filters,
            "order": self.order,
            "order_by": self.order_by,
        });
        blake3::hash(canonical.to_string().as_bytes())
            .to_hex()
            .to_string()
    }

    /// The ID when the query is a single exact `id` match on one value.
    pub fn id_shortcut(&self) -> Option<&str> {
        match self.filters.as_slice() {
            [only]
                if only.name == "id"
                    && only.values.len() == 1
                    && only.mode() == Ok(MatchBy::Exact) =>
            {
                Some(only.values[0].as_str())
            }
            _ => None,
        }
    }

    fn order(&self) -> Order {
        self.order
            .as_deref()
            .and_then(|o| o.parse().ok())
            .unwrap_or_default()
    }

    /// Output document: the query echoed back, its ID, and the results
    /// under `results_key`.
    pub fn output(&self, results_key: &str, items: Vec<JsonValue>) -> JsonValue {
        let mut out = serde_json::Map::new();
        out.insert("id".to_string(), json!(self.synthetic_id()));
        out.insert("filters".to_string(), json!(self.filters));
        out.insert("order".to_string(), json!(self.order));
        out.insert("order_by".to_string(), json!(self.order_by));
        out.insert(results_key.to_string(), JsonValue::Array(items));
        JsonValue::Object(out)
    }
}

/// The filterable fields of a data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    fields: Vec<FilterField>,
}

impl FilterConfig {
    pub fn new(fields: Vec<FilterField>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&FilterField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check a query against the configuration.
    pub fn validate(&self, query: &Query, diags: &mut Diagnostics) {
        for (i, spec) in query.filters.iter().enumerate() {
            let path = format!("filter.{i}");
            if self.field(&spec.name).is_none() {
                diags.error_at(
                    format!("{path}.name"),
                    format!(
                        "{:?} is not a filterable field; expected one of: {}",
                        spec.name,
                        self.fields
                            .iter()
                            .map(|f| f.name)
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                );
            }
            if spec.values.is_empty() {
                diags.error_at(format!("{path}.values"), "at least one value is required");
            }
            match spec.mode() {
                Ok(MatchBy::Regex) => {
                    for value in &spec.values {
                        if let Err(e) = Regex::new(value) {
                            diags.error_at(
                                format!("{path}.values"),
                                format!("invalid regex {value:?}: {e}"),
                            );
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => diags.error_at(format!("{path}.match_by"), e),
            }
        }

        if let Some(order) = &query.order
            && let Err(e) = order.parse::<Order>()
        {
            diags.error_at("order", e);
        }

        if let Some(order_by) = &query.order_by {
            match self.field(order_by) {
                Some(field) if field.is_orderable() => {}
                Some(_) => diags.error_at(
                    "order_by",
                    format!("results cannot be ordered by {order_by:?}"),
                ),
                None => diags.error_at("order_by", format!("unknown field {order_by:?}")),
            }
        }
    }

    fn is_api_predicate(&self, spec: &FilterSpec) -> bool {
        spec.mode() == Ok(MatchBy::Exact)
            && self.field(&spec.name).is_some_and(|f| f.api_filterable)
    }

    /// The server-side part of a query, if any.
    pub fn api_filter(&self, query: &Query) -> Option<Filter> {
        let groups: Vec<Vec<(String, JsonValue)>> = query
            .filters
            .iter()
            .filter(|spec| self.is_api_predicate(spec))
            .filter_map(|spec| {
                let field = self.field(&spec.name)?;
                Some(
                    spec.values
                        .iter()
                        .map(|v| (spec.name.clone(), field.api_value(v)))
                        .collect(),
                )
            })
            .collect();

        let order_hint = query
            .order_by
            .as_deref()
            .filter(|name| self.field(name).is_some_and(|f| f.api_filterable));

        if groups.is_empty() && order_hint.is_none() {
            return None;
        }

        let mut filter = if groups.is_empty() {
            Filter::new()
        } else {
            Filter::all_of_any(groups)
        };
        if let Some(order_by) = order_hint {
            filter = filter.order_by(order_by, query.order());
        }
        Some(filter)
    }

    /// Apply the predicates the API did not evaluate.
    pub fn filter_locally(&self, query: &Query, items: Vec<JsonValue>) -> Result<Vec<JsonValue>> {
        let mut predicates = Vec::new();
        for spec in &query.filters {
            if self.is_api_predicate(spec) {
                continue;
            }
            let mode = spec.mode().map_err(anyhow::Error::msg)?;
            let matcher = Matcher::new(mode, &spec.values)
                .with_context(|| format!("invalid filter on {:?}", spec.name))?;
            predicates.push((spec.name.as_str(), matcher));
        }

        Ok(items
            .into_iter()
            .filter(|item| {
                predicates.iter().all(|(name, matcher)| {
                    normalized_strings(item.get(*name).unwrap_or(&JsonValue::Null))
                        .iter()
                        .any(|v| matcher.matches(v))
                })
            })
            .collect())
    }

    /// Sort results stably by `order_by`, when given.
    pub fn sort(&self, query: &Query, items: &mut [JsonValue]) {
        let Some(order_by) = query.order_by.as_deref() else {
            return;
        };
        let order = query.order();
        items.sort_by(|a, b| {
            let ord = compare_field(a.get(order_by), b.get(order_by));
            match order {
                Order::Asc => ord,
                Order::Desc => ord.reverse(),
            }
        });
    }

    /// Run a query: direct lookup for a lone `id` match, otherwise list with
    /// the API filter, then filter locally and sort.
    pub fn execute<L, G>(&self, query: &Query, list: L, get: G) -> Result<Vec<JsonValue>>
    where
        L: FnOnce(Option<&Filter>) -> Result<Vec<JsonValue>>,
        G: FnOnce(&str) -> Result<Option<JsonValue>>,
    {
        if let Some(id) = query.id_shortcut() {
            log::debug!("Looking up by id {id} directly");
            return Ok(get(id)?.into_iter().collect());
        }

        let filter = self.api_filter(query);
        if let Some(filter) = &filter {
            log::debug!("Listing with filter {}", filter.to_header());
        }
        let items = list(filter.as_ref())?;
        let mut items = self.filter_locally(query, items)?;
        self.sort(query, &mut items);
        Ok(items)
    }
}

enum Matcher {
    Exact(Vec<String>),
    Substring(Vec<String>),
    Regex(Vec<Regex>),
}

impl Matcher {
    fn new(mode: MatchBy, values: &[String]) -> Result<Self> {
        Ok(match mode {
            MatchBy::Exact => Self::Exact(values.to_vec()),
            MatchBy::Substring => Self::Substring(values.to_vec()),
            MatchBy::Regex => Self::Regex(
                values
                    .iter()
                    .map(|v| Regex::new(v).with_context(|| format!("invalid regex {v:?}")))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    fn matches(&self, candidate: &str) -> bool {
        match self {
            Self::Exact(values) => values.iter().any(|v| v == candidate),
            Self::Substring(values) => values.iter().any(|v| candidate.contains(v.as_str())),
            Self::Regex(patterns) => patterns.iter().any(|re| re.is_match(candidate)),
        }
    }
}

/// String forms of a field value; arrays yield one entry per element.
pub fn normalized_strings(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::Array(items) => items.iter().map(normalize_scalar).collect(),
        other => vec![normalize_scalar(other)],
    }
}

fn normalize_scalar(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0) {
                format!("{f:.0}")
            } else {
                n.to_string()
            }
        }
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_field(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => {
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => Ordering::Equal,
            }
        }
        _ => {
            let x = a.map(normalize_scalar).unwrap_or_default();
            let y = b.map(normalize_scalar).unwrap_or_default();
            x.cmp(&y)
        }
    }
}

/// A read-only data source.
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Data source name, e.g. `linode_domains`
    fn type_name(&self) -> &'static str;

    /// Arguments and results
    fn model(&self) -> &Schema;

    /// Validate arguments before reading.
    fn validate(&self, _args: &JsonValue, _diags: &mut Diagnostics) {}

    /// Run the lookup and return the result document.
    fn read(&self, ctx: &mut ApplyContext, args: &JsonValue) -> Result<JsonValue>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FilterConfig {
        FilterConfig::new(vec![
            FilterField::api("id", FieldType::Int),
            FilterField::api("label", FieldType::String),
            FilterField::api("tags", FieldType::String),
            FilterField::local("status", FieldType::String).orderable(),
            FilterField::local("created", FieldType::String),
        ])
    }

    fn items() -> Vec<JsonValue> {
        vec![
            json!({"id": 3, "label": "web-2", "status": "enabled", "tags": ["prod"]}),
            json!({"id": 1, "label": "web-1", "status": "disabled", "tags": ["dev", "prod"]}),
            json!({"id": 2, "label": "db", "status": "enabled", "tags": []}),
        ]
    }

    fn query(filters: Vec<FilterSpec>) -> Query {
        Query {
            filters,
            ..Default::default()
        }
    }

    #[test]
    fn test_match_by_parse() {
        assert_eq!("sub".parse::<MatchBy>().unwrap(), MatchBy::Substring);
        assert_eq!("re".parse::<MatchBy>().unwrap(), MatchBy::Regex);
        assert_eq!("exact".parse::<MatchBy>().unwrap(), MatchBy::Exact);
        assert!("fuzzy".parse::<MatchBy>().is_err());
    }

    #[test]
    fn test_validate() {
        let q = Query {
            filters: vec![
                FilterSpec::exact("nope", ["x"]),
                FilterSpec::matching("label", ["x"], "fuzzy"),
                FilterSpec::matching("label", ["("], "regex"),
            ],
            order: Some("sideways".to_string()),
            order_by: Some("created".to_string()),
        };
        let mut diags = Diagnostics::new();
        config().validate(&q, &mut diags);
        let attrs: Vec<_> = diags
            .iter()
            .map(|d| d.attribute.clone().unwrap_or_default())
            .collect();
        assert_eq!(
            attrs,
            vec![
                "filter.0.name",
                "filter.1.match_by",
                "filter.2.values",
                "order",
                "order_by"
            ]
        );
    }

    #[test]
    fn test_order_override_allows_local_field() {
        let q = Query {
            order_by: Some("status".to_string()),
            ..Default::default()
        };
        let mut diags = Diagnostics::new();
        config().validate(&q, &mut diags);
        assert!(diags.is_empty());
        // Local fields never produce server-side ordering hints.
        assert!(config().api_filter(&q).is_none());
    }

    #[test]
    fn test_api_filter_types_values() {
        let q = Query {
            filters: vec![
                FilterSpec::exact("id", ["1", "2"]),
                FilterSpec::exact("tags", ["prod"]),
                FilterSpec::exact("status", ["enabled"]),
                FilterSpec::matching("label", ["web"], "sub"),
            ],
            order: Some("desc".to_string()),
            order_by: Some("label".to_string()),
        };
        let filter = config().api_filter(&q).unwrap();
        assert_eq!(
            filter.as_value(),
            json!({
                "+and": [
                    {"+or": [{"id": 1}, {"id": 2}]},
                    {"+or": [{"tags": "prod"}]}
                ],
                "+order_by": "label",
                "+order": "desc"
            })
        );
    }

    #[test]
    fn test_local_filtering() {
        let q = query(vec![
            FilterSpec::exact("status", ["enabled"]),
            FilterSpec::matching("label", ["web"], "substring"),
        ]);
        let out = config().filter_locally(&q, items()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], 3);
    }

    #[test]
    fn test_local_regex_and_slice_fields() {
        let q = query(vec![FilterSpec::matching("tags", ["^de"], "re")]);
        let out = config().filter_locally(&q, items()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], 1);
    }

    #[test]
    fn test_sort_numeric_and_stable() {
        let mut data = items();
        let q = Query {
            order_by: Some("id".to_string()),
            order: Some("desc".to_string()),
            ..Default::default()
        };
        config().sort(&q, &mut data);
        let ids: Vec<_> = data.iter().map(|i| i["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        let mut data = items();
        let q = Query {
            order_by: Some("status".to_string()),
            ..Default::default()
        };
        config().sort(&q, &mut data);
        let ids: Vec<_> = data.iter().map(|i| i["id"].as_i64().unwrap()).collect();
        // disabled first, then the two enabled items in their original order
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn test_synthetic_id_is_deterministic() {
        let a = query(vec![FilterSpec::exact("label", ["web"])]);
        let b = query(vec![FilterSpec::exact("label", ["web"])]);
        let c = query(vec![FilterSpec::exact("label", ["db"])]);
        assert_eq!(a.synthetic_id(), b.synthetic_id());
        assert_ne!(a.synthetic_id(), c.synthetic_id());
        assert_eq!(a.synthetic_id().len(), 64);
    }

    #[test]
    fn test_id_shortcut() {
        assert_eq!(
            query(vec![FilterSpec::exact("id", ["7"])]).id_shortcut(),
            Some("7")
        );
        assert_eq!(
            query(vec![FilterSpec::exact("id", ["7", "8"])]).id_shortcut(),
            None
        );
        assert_eq!(
            query(vec![FilterSpec::matching("id", ["7"], "sub")]).id_shortcut(),
            None
        );
    }

    #[test]
    fn test_execute_uses_get_for_id() {
        let q = query(vec![FilterSpec::exact("id", ["9"])]);
        let out = config()
            .execute(
                &q,
                |_| panic!("list must not be called"),
                |id| Ok((id == "9").then(|| json!({"id": 9}))),
            )
            .unwrap();
        assert_eq!(out, vec![json!({"id": 9})]);

        let out = config()
            .execute(&q, |_| panic!("list must not be called"), |_| Ok(None))
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_execute_lists_and_filters() {
        let q = Query {
            filters: vec![FilterSpec::exact("status", ["enabled"])],
            order_by: Some("id".to_string()),
            ..Default::default()
        };
        let out = config()
            .execute(
                &q,
                |filter| {
                    // Only the ordering hint goes to the API.
                    assert_eq!(filter.unwrap().ordering(), Some(("id", Order::Asc)));
                    Ok(items())
                },
                |_| Ok(None),
            )
            .unwrap();
        let ids: Vec<_> = out.iter().map(|i| i["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_normalized_strings() {
        assert_eq!(normalized_strings(&json!(null)), vec![""]);
        assert_eq!(normalized_strings(&json!(true)), vec!["true"]);
        assert_eq!(normalized_strings(&json!(3.0)), vec!["3"]);
        assert_eq!(normalized_strings(&json!(["a", 1])), vec!["a", "1"]);
    }
}
