//! Read-only lookups.
//!
//! The list sources share one argument shape (`filters`, `order`,
//! `order_by`) and one result shape: the query echoed back with a
//! deterministic `id` and the matching entities under a results key.

mod domain;
mod domains;
mod firewalls;
mod reserved_ips;

pub use domain::DomainLookup;
pub use domains::DomainsSource;
pub use firewalls::FirewallsSource;
pub use reserved_ips::ReservedIpsSource;

use anyhow::{Context, Result};
use reconcile::{Attribute, Diagnostics, FilterConfig, Kind, Query, Schema, Validator};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Model of a filtered list source; `items` describes one result.
pub(crate) fn list_schema(
    type_name: &'static str,
    description: &'static str,
    results_key: &'static str,
    items: Vec<Attribute>,
) -> Schema {
    Schema::new(type_name, description)
        .attr(Attribute::computed("id", Kind::String))
        .attr(
            Attribute::optional("filters", Kind::object_list()).nested(vec![
                Attribute::required("name", Kind::String),
                Attribute::required("values", Kind::string_list()),
                Attribute::optional("match_by", Kind::String)
                    .validate(Validator::OneOf(&["exact", "substring", "sub", "regex", "re"])),
            ]),
        )
        .attr(
            Attribute::optional("order", Kind::String)
                .validate(Validator::OneOf(&["asc", "desc"])),
        )
        .attr(Attribute::optional("order_by", Kind::String))
        .attr(Attribute::computed(results_key, Kind::object_list()).nested(items))
}

/// Parse query arguments; `null` means no filtering.
pub(crate) fn parse_query(args: &JsonValue) -> Result<Query> {
    if args.is_null() {
        return Ok(Query::default());
    }
    serde_json::from_value(args.clone()).context("invalid query arguments")
}

/// Validate query arguments against a filter configuration.
pub(crate) fn validate_query(config: &FilterConfig, args: &JsonValue, diags: &mut Diagnostics) {
    match parse_query(args) {
        Ok(query) => config.validate(&query, diags),
        Err(e) => diags.error(format!("{e:#}")),
    }
}

/// An API entity as a result item.
pub(crate) fn item<T: Serialize>(entity: &T) -> Result<JsonValue> {
    serde_json::to_value(entity).context("failed to encode result")
}
