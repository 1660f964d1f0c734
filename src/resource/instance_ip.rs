use super::reserved_ip::flatten_address;
use super::{deleted, found};
use crate::provider::Provider;
use anyhow::{Context, Result};
use linode_api::types::{InstanceIpAddOptions, IpAddress, IpAddressUpdateOptions};
use reconcile::resource::{parse_id, parse_import_id};
use reconcile::waiter::min_start;
use reconcile::{
    ApplyContext, Attribute, ChangeSet, Kind, ReadOutcome, Reconciler, Schema, State, Value,
};
use std::time::Duration;

/// How long to wait for the reboot that applies a new address.
const REBOOT_TIMEOUT: Duration = Duration::from_secs(600);

/// `linode_instance_ip`: an IPv4 address assigned to an instance.
///
/// With `address` set, an existing reserved IP is assigned instead of a new
/// one being allocated. The ID is the address.
#[derive(Debug)]
pub struct InstanceIpResource {
    provider: Provider,
    schema: Schema,
}

impl InstanceIpResource {
    pub fn new(provider: Provider) -> Self {
        let schema = Schema::new("linode_instance_ip", "An IPv4 address assigned to a Linode")
            .attr(Attribute::computed("id", Kind::String))
            .attr(Attribute::required("linode_id", Kind::Int).force_replace())
            .attr(
                Attribute::optional("public", Kind::Bool)
                    .default(true)
                    .force_replace(),
            )
            .attr(
                Attribute::optional_computed("address", Kind::String)
                    .force_replace()
                    .describe("A reserved IP to assign; allocated when unset"),
            )
            .attr(Attribute::optional_computed("rdns", Kind::String))
            .attr(
                Attribute::optional("apply_immediately", Kind::Bool)
                    .default(false)
                    .describe("Reboot a running instance so the address takes effect"),
            )
            .attr(Attribute::computed("gateway", Kind::String))
            .attr(Attribute::computed("subnet_mask", Kind::String))
            .attr(Attribute::computed("prefix", Kind::Int))
            .attr(Attribute::computed("type", Kind::String))
            .attr(Attribute::computed("region", Kind::String))
            .attr(Attribute::computed("reserved", Kind::Bool));
        Self { provider, schema }
    }

    /// `apply_immediately` is not an API field; it rides along from the
    /// caller's state.
    fn flatten(ip: &IpAddress, apply_immediately: &Value) -> State {
        let apply = apply_immediately.as_bool().unwrap_or(false);
        flatten_address(ip).with("apply_immediately", apply)
    }

    fn fetch(
        &self,
        ctx: &ApplyContext,
        linode_id: i64,
        address: &str,
    ) -> Result<Option<IpAddress>> {
        found(
            self.provider
                .client
                .get_instance_ip(&ctx.cancel, linode_id, address),
        )
        .with_context(|| format!("failed to read {address} of linode {linode_id}"))
    }

    fn set_rdns(
        &self,
        ctx: &ApplyContext,
        linode_id: i64,
        address: &str,
        rdns: Option<&str>,
    ) -> Result<IpAddress> {
        log::debug!("Setting rDNS of {address} to {rdns:?}");
        self.provider
            .client
            .update_instance_ip(
                &ctx.cancel,
                linode_id,
                address,
                &IpAddressUpdateOptions {
                    rdns: rdns.map(ToString::to_string),
                },
            )
            .with_context(|| format!("failed to set rDNS of {address}"))
    }

    /// Reboot the instance so a new address is configured, when allowed and
    /// the instance is running.
    fn apply_now(&self, ctx: &mut ApplyContext, linode_id: i64) -> Result<()> {
        if self.provider.skip_implicit_reboots {
            log::info!("Not rebooting linode {linode_id}: implicit reboots are disabled");
            return Ok(());
        }
        let client = &self.provider.client;
        let instance = client
            .get_instance(&ctx.cancel, linode_id)
            .with_context(|| format!("failed to read linode {linode_id}"))?;
        if !instance.is_running() {
            log::debug!("Linode {linode_id} is {}; no reboot needed", instance.status);
            return Ok(());
        }

        let since = min_start();
        log::info!("Rebooting linode {linode_id} to apply its new address");
        client
            .reboot_instance(&ctx.cancel, linode_id)
            .with_context(|| format!("failed to reboot linode {linode_id}"))?;
        self.provider
            .waiter
            .wait_for(&ctx.cancel, "linode", linode_id, "linode_reboot", since, REBOOT_TIMEOUT)
            .with_context(|| format!("linode {linode_id} did not finish rebooting"))?;
        Ok(())
    }
}

impl Reconciler for InstanceIpResource {
    fn type_name(&self) -> &'static str {
        "linode_instance_ip"
    }

    fn model(&self) -> &Schema {
        &self.schema
    }

    fn create(&self, ctx: &mut ApplyContext, planned: &State) -> Result<State> {
        let linode_id = planned.require_int("linode_id")?;
        let opts = InstanceIpAddOptions {
            ip_type: "ipv4".to_string(),
            public: planned.bool("public").unwrap_or(true),
            address: planned.str("address").map(ToString::to_string),
        };
        let mut ip = self
            .provider
            .client
            .add_instance_ip(&ctx.cancel, linode_id, &opts)
            .with_context(|| format!("failed to add an IP to linode {linode_id}"))?;
        let apply_immediately = planned.get("apply_immediately");
        ctx.checkpoint(&Self::flatten(&ip, apply_immediately));
        log::info!("Assigned {} to linode {linode_id}", ip.address);

        if let Some(rdns) = planned.str("rdns")
            && ip.rdns.as_deref() != Some(rdns)
        {
            ip = self.set_rdns(ctx, linode_id, &ip.address, Some(rdns))?;
        }
        if apply_immediately.as_bool() == Some(true) {
            self.apply_now(ctx, linode_id)?;
        }
        Ok(Self::flatten(&ip, apply_immediately))
    }

    fn read(&self, ctx: &mut ApplyContext, prior: &State) -> Result<ReadOutcome> {
        let linode_id = prior.require_int("linode_id")?;
        let address = prior.require_str("id")?;
        Ok(self
            .fetch(ctx, linode_id, address)?
            .map_or(ReadOutcome::Gone, |ip| {
                ReadOutcome::Found(Self::flatten(&ip, prior.get("apply_immediately")))
            }))
    }

    fn update(
        &self,
        ctx: &mut ApplyContext,
        prior: &State,
        planned: &State,
        changes: &ChangeSet,
    ) -> Result<State> {
        if !changes.any_update() {
            return Ok(prior.clone());
        }
        let apply_immediately = planned.get("apply_immediately");
        if !changes.changed("rdns") {
            return Ok(prior.clone().with("apply_immediately", apply_immediately.clone()));
        }
        let linode_id = prior.require_int("linode_id")?;
        let address = prior.require_str("id")?;
        let ip = self.set_rdns(ctx, linode_id, address, planned.str("rdns"))?;
        Ok(Self::flatten(&ip, apply_immediately))
    }

    fn delete(&self, ctx: &mut ApplyContext, prior: &State) -> Result<()> {
        let linode_id = prior.require_int("linode_id")?;
        let address = prior.require_str("id")?;
        deleted(
            self.provider
                .client
                .delete_instance_ip(&ctx.cancel, linode_id, address),
            &format!("{address} of linode {linode_id}"),
        )
        .with_context(|| format!("failed to remove {address} from linode {linode_id}"))
    }

    /// Import ID format: `linode_id,address`.
    fn import(&self, ctx: &mut ApplyContext, id: &str) -> Result<ReadOutcome> {
        let parts = parse_import_id(id, &["linode_id", "address"])?;
        let linode_id = parse_id(&parts[0], "linode_id")?;
        Ok(self
            .fetch(ctx, linode_id, &parts[1])?
            .map_or(ReadOutcome::Gone, |ip| {
                ReadOutcome::Found(Self::flatten(&ip, &Value::Null))
            }))
    }
}
