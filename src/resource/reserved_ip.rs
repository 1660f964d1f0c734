use super::{deleted, found};
use crate::provider::Provider;
use anyhow::{Context, Result};
use linode_api::types::{IpAddress, ReserveIpOptions};
use reconcile::{
    ApplyContext, Attribute, ChangeSet, Kind, ReadOutcome, Reconciler, Schema, State,
};

/// Flatten the fields every IP address model shares.
pub(crate) fn flatten_address(ip: &IpAddress) -> State {
    State::new()
        .with("id", ip.address.as_str())
        .with("address", ip.address.as_str())
        .with("gateway", ip.gateway.as_deref())
        .with("subnet_mask", ip.subnet_mask.as_str())
        .with("prefix", ip.prefix)
        .with("type", ip.ip_type.as_str())
        .with("public", ip.public)
        .with("rdns", ip.rdns.as_deref().filter(|r| !r.is_empty()))
        .with("linode_id", ip.linode_id)
        .with("region", ip.region.as_str())
        .with("reserved", ip.reserved)
}

/// `linode_reserved_ip`: an IPv4 address held in a region.
///
/// The ID is the address itself.
#[derive(Debug)]
pub struct ReservedIpResource {
    provider: Provider,
    schema: Schema,
}

impl ReservedIpResource {
    pub fn new(provider: Provider) -> Self {
        let schema = Schema::new("linode_reserved_ip", "A reserved IPv4 address")
            .attr(Attribute::computed("id", Kind::String))
            .attr(Attribute::required("region", Kind::String).force_replace())
            .attr(Attribute::computed("address", Kind::String))
            .attr(Attribute::computed("gateway", Kind::String))
            .attr(Attribute::computed("subnet_mask", Kind::String))
            .attr(Attribute::computed("prefix", Kind::Int))
            .attr(Attribute::computed("type", Kind::String))
            .attr(Attribute::computed("public", Kind::Bool))
            .attr(Attribute::computed("rdns", Kind::String))
            .attr(Attribute::computed("linode_id", Kind::Int))
            .attr(Attribute::computed("reserved", Kind::Bool));
        Self { provider, schema }
    }

    fn flatten(ip: &IpAddress) -> State {
        flatten_address(ip)
    }
}

impl Reconciler for ReservedIpResource {
    fn type_name(&self) -> &'static str {
        "linode_reserved_ip"
    }

    fn model(&self) -> &Schema {
        &self.schema
    }

    fn create(&self, ctx: &mut ApplyContext, planned: &State) -> Result<State> {
        let region = planned.require_str("region")?;
        let ip = self
            .provider
            .client
            .reserve_ip(
                &ctx.cancel,
                &ReserveIpOptions {
                    region: region.to_string(),
                },
            )
            .with_context(|| format!("failed to reserve an IP in {region}"))?;
        let state = Self::flatten(&ip);
        ctx.checkpoint(&state);
        log::info!("Reserved {} in {region}", ip.address);
        Ok(state)
    }

    fn read(&self, ctx: &mut ApplyContext, prior: &State) -> Result<ReadOutcome> {
        let address = prior.require_str("id")?;
        let ip = found(self.provider.client.get_reserved_ip(&ctx.cancel, address))
            .with_context(|| format!("failed to read reserved IP {address}"))?;
        Ok(ip.map_or(ReadOutcome::Gone, |ip| ReadOutcome::Found(Self::flatten(&ip))))
    }

    /// Nothing is updatable; the prior state stands.
    fn update(
        &self,
        _ctx: &mut ApplyContext,
        prior: &State,
        _planned: &State,
        _changes: &ChangeSet,
    ) -> Result<State> {
        Ok(prior.clone())
    }

    fn delete(&self, ctx: &mut ApplyContext, prior: &State) -> Result<()> {
        let address = prior.require_str("id")?;
        deleted(
            self.provider.client.delete_reserved_ip(&ctx.cancel, address),
            &format!("reserved IP {address}"),
        )
        .with_context(|| format!("failed to release reserved IP {address}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{ctx, provider};
    use linode_api::MockClient;
    use reconcile::diff::{self, Action};

    fn create(r: &ReservedIpResource) -> State {
        let config = State::new().with("region", "us-east");
        let planned = diff::plan(r.model(), None, Some(&config)).planned.unwrap();
        r.create(&mut ctx(), &planned).unwrap()
    }

    #[test]
    fn test_reserve_and_read() {
        let mock = MockClient::new();
        let r = ReservedIpResource::new(provider(&mock));
        let state = create(&r);
        assert_eq!(state.str("id"), Some("198.51.100.1"));
        assert_eq!(state.bool("reserved"), Some(true));
        assert!(state.get("linode_id").is_null());
        assert!(state.get("rdns").is_null());

        let read = r.read(&mut ctx(), &state).unwrap().into_state().unwrap();
        assert_eq!(read, state);
    }

    #[test]
    fn test_region_change_replaces() {
        let r = ReservedIpResource::new(provider(&MockClient::new()));
        let state = create(&r);
        let plan = diff::plan(
            r.model(),
            Some(&state),
            Some(&State::new().with("region", "eu-west")),
        );
        assert_eq!(plan.changes.action, Action::Replace);
    }

    #[test]
    fn test_import_by_address() {
        let mock = MockClient::new();
        let r = ReservedIpResource::new(provider(&mock));
        let state = create(&r);
        let imported = r.import(&mut ctx(), "198.51.100.1").unwrap().into_state().unwrap();
        assert_eq!(imported, state);
    }

    #[test]
    fn test_delete_tolerates_missing() {
        let mock = MockClient::new();
        let r = ReservedIpResource::new(provider(&mock));
        let state = create(&r);
        mock.remove_reserved_ip("198.51.100.1");
        assert!(r.read(&mut ctx(), &state).unwrap().is_gone());
        r.delete(&mut ctx(), &state).unwrap();
        assert_eq!(
            mock.mutating_calls().last().map(String::as_str),
            Some("DELETE /networking/reserved/ips/198.51.100.1")
        );
    }
}
