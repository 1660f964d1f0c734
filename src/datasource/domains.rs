use super::{item, list_schema, parse_query, validate_query};
use crate::provider::Provider;
use crate::resource::found;
use anyhow::{Context, Result};
use reconcile::datasource::{FieldType, FilterField};
use reconcile::resource::parse_id;
use reconcile::{ApplyContext, Attribute, DataSource, Diagnostics, FilterConfig, Kind, Schema};
use serde_json::Value as JsonValue;

/// Result attributes shared by the domain list and the single lookup.
pub(crate) fn domain_attributes() -> Vec<Attribute> {
    let mut attrs = vec![
        Attribute::computed("id", Kind::Int),
        Attribute::computed("domain", Kind::String),
        Attribute::computed("type", Kind::String),
        Attribute::computed("group", Kind::String),
        Attribute::computed("status", Kind::String),
        Attribute::computed("description", Kind::String),
        Attribute::computed("soa_email", Kind::String),
        Attribute::computed("master_ips", Kind::string_set()),
        Attribute::computed("axfr_ips", Kind::string_set()),
        Attribute::computed("tags", Kind::string_set()),
    ];
    for ttl in ["ttl_sec", "retry_sec", "expire_sec", "refresh_sec"] {
        attrs.push(Attribute::computed(ttl, Kind::Int));
    }
    attrs
}

fn filter_config() -> FilterConfig {
    FilterConfig::new(vec![
        FilterField::api("id", FieldType::Int),
        FilterField::api("domain", FieldType::String),
        FilterField::api("group", FieldType::String),
        FilterField::api("tags", FieldType::String),
        FilterField::local("type", FieldType::String),
        FilterField::local("status", FieldType::String),
        FilterField::local("description", FieldType::String),
        FilterField::local("soa_email", FieldType::String),
        FilterField::local("master_ips", FieldType::String),
        FilterField::local("axfr_ips", FieldType::String),
        FilterField::local("ttl_sec", FieldType::Int).orderable(),
        FilterField::local("retry_sec", FieldType::Int),
        FilterField::local("expire_sec", FieldType::Int),
        FilterField::local("refresh_sec", FieldType::Int),
    ])
}

/// `linode_domains`: every zone matching a query.
#[derive(Debug)]
pub struct DomainsSource {
    provider: Provider,
    schema: Schema,
    filters: FilterConfig,
}

impl DomainsSource {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            schema: list_schema(
                "linode_domains",
                "DNS zones matching a query",
                "domains",
                domain_attributes(),
            ),
            filters: filter_config(),
        }
    }
}

impl DataSource for DomainsSource {
    fn type_name(&self) -> &'static str {
        "linode_domains"
    }

    fn model(&self) -> &Schema {
        &self.schema
    }

    fn validate(&self, args: &JsonValue, diags: &mut Diagnostics) {
        validate_query(&self.filters, args, diags);
    }

    fn read(&self, ctx: &mut ApplyContext, args: &JsonValue) -> Result<JsonValue> {
        let query = parse_query(args)?;
        let client = &self.provider.client;
        let cancel = &ctx.cancel;
        let domains = self.filters.execute(
            &query,
            |filter| {
                client
                    .list_domains(cancel, filter)
                    .context("failed to list domains")?
                    .iter()
                    .map(item)
                    .collect()
            },
            |id| {
                let id = parse_id(id, "id")?;
                found(client.get_domain(cancel, id))
                    .with_context(|| format!("failed to read domain {id}"))?
                    .as_ref()
                    .map(item)
                    .transpose()
            },
        )?;
        log::debug!("linode_domains matched {} zones", domains.len());
        Ok(query.output("domains", domains))
    }
}
