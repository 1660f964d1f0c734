use super::{item, list_schema, parse_query, validate_query};
use crate::provider::Provider;
use crate::resource::found;
use anyhow::{Context, Result};
use linode_api::types::IpAddress;
use reconcile::datasource::{FieldType, FilterField};
use reconcile::{ApplyContext, Attribute, DataSource, Diagnostics, FilterConfig, Kind, Schema};
use serde_json::Value as JsonValue;

fn filter_config() -> FilterConfig {
    FilterConfig::new(vec![
        FilterField::api("address", FieldType::String),
        FilterField::api("region", FieldType::String),
        FilterField::api("linode_id", FieldType::Int),
        FilterField::local("id", FieldType::String),
        FilterField::local("gateway", FieldType::String),
        FilterField::local("prefix", FieldType::Int),
        FilterField::local("rdns", FieldType::String),
        FilterField::local("public", FieldType::Bool),
    ])
}

/// A reserved address as a result item, with its address as `id`.
fn ip_item(ip: &IpAddress) -> Result<JsonValue> {
    let mut value = item(ip)?;
    if let Some(fields) = value.as_object_mut() {
        fields.insert("id".to_string(), JsonValue::String(ip.address.clone()));
    }
    Ok(value)
}

/// `linode_reserved_ips`: reserved IPv4 addresses matching a query.
#[derive(Debug)]
pub struct ReservedIpsSource {
    provider: Provider,
    schema: Schema,
    filters: FilterConfig,
}

impl ReservedIpsSource {
    pub fn new(provider: Provider) -> Self {
        let schema = list_schema(
            "linode_reserved_ips",
            "Reserved IPv4 addresses matching a query",
            "reserved_ips",
            vec![
                Attribute::computed("id", Kind::String),
                Attribute::computed("address", Kind::String),
                Attribute::computed("region", Kind::String),
                Attribute::computed("gateway", Kind::String),
                Attribute::computed("subnet_mask", Kind::String),
                Attribute::computed("prefix", Kind::Int),
                Attribute::computed("type", Kind::String),
                Attribute::computed("public", Kind::Bool),
                Attribute::computed("rdns", Kind::String),
                Attribute::computed("linode_id", Kind::Int),
                Attribute::computed("reserved", Kind::Bool),
            ],
        );
        Self {
            provider,
            schema,
            filters: filter_config(),
        }
    }
}

impl DataSource for ReservedIpsSource {
    fn type_name(&self) -> &'static str {
        "linode_reserved_ips"
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
        let ips = self.filters.execute(
            &query,
            |filter| {
                client
                    .list_reserved_ips(cancel, filter)
                    .context("failed to list reserved IPs")?
                    .iter()
                    .map(ip_item)
                    .collect()
            },
            |address| {
                found(client.get_reserved_ip(cancel, address))
                    .with_context(|| format!("failed to read reserved IP {address}"))?
                    .as_ref()
                    .map(ip_item)
                    .transpose()
            },
        )?;
        Ok(query.output("reserved_ips", ips))
    }
}
