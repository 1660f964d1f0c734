use super::{list_schema, parse_query, validate_query};
use crate::provider::Provider;
use crate::resource::found;
use anyhow::{Context, Result};
use linode_api::{CancelToken, CloudClient};
use linode_api::types::{Firewall, format_time};
use reconcile::datasource::{FieldType, FilterField};
use reconcile::resource::parse_id;
use reconcile::{ApplyContext, Attribute, DataSource, Diagnostics, FilterConfig, Kind, Schema};
use serde_json::{Value as JsonValue, json};

fn filter_config() -> FilterConfig {
    FilterConfig::new(vec![
        FilterField::api("id", FieldType::Int),
        FilterField::api("label", FieldType::String),
        FilterField::api("tags", FieldType::String),
        FilterField::local("status", FieldType::String),
        FilterField::local("created", FieldType::String).orderable(),
        FilterField::local("updated", FieldType::String).orderable(),
    ])
}

/// One firewall with its attachments, as a result item.
fn firewall_item(
    client: &dyn CloudClient,
    cancel: &CancelToken,
    firewall: &Firewall,
) -> Result<JsonValue> {
    let mut devices = client
        .list_firewall_devices(cancel, firewall.id)
        .with_context(|| format!("failed to list devices of firewall {}", firewall.id))?;
    devices.sort_by_key(|d| d.id);
    let entity_ids = |entity_type: &str| -> Vec<i64> {
        devices
            .iter()
            .filter(|d| d.entity.entity_type == entity_type)
            .map(|d| d.entity.id)
            .collect()
    };
    let device_items: Vec<JsonValue> = devices
        .iter()
        .map(|d| {
            json!({
                "id": d.id,
                "entity_id": d.entity.id,
                "type": d.entity.entity_type,
                "label": d.entity.label,
                "url": d.entity.url,
            })
        })
        .collect();
    Ok(json!({
        "id": firewall.id,
        "label": firewall.label,
        "tags": firewall.tags,
        "status": firewall.status,
        "disabled": firewall.status == "disabled",
        "inbound": firewall.rules.inbound,
        "inbound_policy": firewall.rules.inbound_policy,
        "outbound": firewall.rules.outbound,
        "outbound_policy": firewall.rules.outbound_policy,
        "linodes": entity_ids("linode"),
        "nodebalancers": entity_ids("nodebalancer"),
        "devices": device_items,
        "created": firewall.created.as_ref().map(format_time),
        "updated": firewall.updated.as_ref().map(format_time),
    }))
}

/// `linode_firewalls`: every Cloud Firewall matching a query.
#[derive(Debug)]
pub struct FirewallsSource {
    provider: Provider,
    schema: Schema,
    filters: FilterConfig,
}

impl FirewallsSource {
    pub fn new(provider: Provider) -> Self {
        let schema = list_schema(
            "linode_firewalls",
            "Cloud Firewalls matching a query",
            "firewalls",
            vec![
                Attribute::computed("id", Kind::Int),
                Attribute::computed("label", Kind::String),
                Attribute::computed("tags", Kind::string_set()),
                Attribute::computed("status", Kind::String),
                Attribute::computed("disabled", Kind::Bool),
                Attribute::computed("inbound", Kind::object_list()),
                Attribute::computed("inbound_policy", Kind::String),
                Attribute::computed("outbound", Kind::object_list()),
                Attribute::computed("outbound_policy", Kind::String),
                Attribute::computed("linodes", Kind::int_set()),
                Attribute::computed("nodebalancers", Kind::int_set()),
                Attribute::computed("devices", Kind::object_list()),
                Attribute::computed("created", Kind::String),
                Attribute::computed("updated", Kind::String),
            ],
        );
        Self {
            provider,
            schema,
            filters: filter_config(),
        }
    }
}

impl DataSource for FirewallsSource {
    fn type_name(&self) -> &'static str {
        "linode_firewalls"
    }

    fn model(&self) -> &Schema {
        &self.schema
    }

    fn validate(&self, args: &JsonValue, diags: &mut Diagnostics) {
        validate_query(&self.filters, args, diags);
    }

    fn read(&self, ctx: &mut ApplyContext, args: &JsonValue) -> Result<JsonValue> {
        let query = parse_query(args)?;
        let client = self.provider.client.as_ref();
        let cancel = &ctx.cancel;
        let firewalls = self.filters.execute(
            &query,
            |filter| {
                client
                    .list_firewalls(cancel, filter)
                    .context("failed to list firewalls")?
                    .iter()
                    .map(|fw| firewall_item(client, cancel, fw))
                    .collect()
            },
            |id| {
                let id = parse_id(id, "id")?;
                found(client.get_firewall(cancel, id))
                    .with_context(|| format!("failed to read firewall {id}"))?
                    .map(|fw| firewall_item(client, cancel, &fw))
                    .transpose()
            },
        )?;
        Ok(query.output("firewalls", firewalls))
    }
}
