use super::domains::domain_attributes;
use super::item;
use crate::provider::Provider;
use anyhow::{Context, Result, anyhow};
use linode_api::Filter;
use reconcile::{ApplyContext, Attribute, DataSource, Diagnostics, Kind, Schema};
use serde::Deserialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LookupArgs {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    domain: Option<String>,
}

impl LookupArgs {
    fn parse(args: &JsonValue) -> Result<Self> {
        if args.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(args.clone()).context("invalid lookup arguments")
    }
}

/// `linode_domain`: one zone, by `id` or by `domain` name.
#[derive(Debug)]
pub struct DomainLookup {
    provider: Provider,
    schema: Schema,
}

impl DomainLookup {
    pub fn new(provider: Provider) -> Self {
        let mut schema = Schema::new("linode_domain", "A single DNS zone")
            .attr(Attribute::optional("id", Kind::Int))
            .attr(Attribute::optional("domain", Kind::String));
        for attr in domain_attributes() {
            if !matches!(attr.name, "id" | "domain") {
                schema = schema.attr(attr);
            }
        }
        Self { provider, schema }
    }
}

impl DataSource for DomainLookup {
    fn type_name(&self) -> &'static str {
        "linode_domain"
    }

    fn model(&self) -> &Schema {
        &self.schema
    }

    fn validate(&self, args: &JsonValue, diags: &mut Diagnostics) {
        match LookupArgs::parse(args) {
            Ok(LookupArgs {
                id: Some(_),
                domain: Some(_),
            }) => diags.error_at("id", "only one of id and domain may be set"),
            Ok(LookupArgs {
                id: None,
                domain: None,
            }) => diags.error("one of id or domain is required"),
            Ok(_) => {}
            Err(e) => diags.error(format!("{e:#}")),
        }
    }

    fn read(&self, ctx: &mut ApplyContext, args: &JsonValue) -> Result<JsonValue> {
        let args = LookupArgs::parse(args)?;
        let client = &self.provider.client;
        let domain = match (args.id, args.domain.as_deref()) {
            (Some(id), _) => client
                .get_domain(&ctx.cancel, id)
                .with_context(|| format!("failed to read domain {id}"))?,
            (None, Some(name)) => {
                let filter = Filter::new().eq("domain", name);
                client
                    .list_domains(&ctx.cancel, Some(&filter))
                    .with_context(|| format!("failed to look up domain {name}"))?
                    .into_iter()
                    .find(|d| d.domain == name)
                    .ok_or_else(|| anyhow!("domain {name} was not found"))?
            }
            (None, None) => return Err(anyhow!("one of id or domain is required")),
        };
        item(&domain)
    }
}
