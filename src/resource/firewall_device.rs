use super::{deleted, found, timestamp};
use crate::provider::Provider;
use anyhow::{Context, Result};
use linode_api::types::{FirewallDevice, FirewallDeviceCreateOptions};
use reconcile::resource::{parse_id, parse_import_id};
use reconcile::{
    ApplyContext, Attribute, ChangeSet, Kind, ReadOutcome, Reconciler, Schema, State, Validator,
};

/// `linode_firewall_device`: one entity attached to a firewall.
///
/// Every configurable attribute forces replacement, so `update` only ever
/// sees computed drift.
#[derive(Debug)]
pub struct FirewallDeviceResource {
    provider: Provider,
    schema: Schema,
}

impl FirewallDeviceResource {
    pub fn new(provider: Provider) -> Self {
        let schema = Schema::new("linode_firewall_device", "An entity attached to a Cloud Firewall")
            .attr(Attribute::computed("id", Kind::String))
            .attr(Attribute::required("firewall_id", Kind::Int).force_replace())
            .attr(Attribute::required("entity_id", Kind::Int).force_replace())
            .attr(
                Attribute::optional("entity_type", Kind::String)
                    .default("linode")
                    .force_replace()
                    .validate(Validator::OneOf(&["linode", "nodebalancer"])),
            )
            .attr(Attribute::computed("created", Kind::String))
            .attr(Attribute::computed("updated", Kind::String));
        Self { provider, schema }
    }

    fn flatten(firewall_id: i64, device: &FirewallDevice) -> State {
        State::new()
            .with("id", device.id.to_string())
            .with("firewall_id", firewall_id)
            .with("entity_id", device.entity.id)
            .with("entity_type", device.entity.entity_type.as_str())
            .with("created", timestamp(device.created.as_ref()))
            .with("updated", timestamp(device.updated.as_ref()))
    }

    fn fetch(&self, ctx: &ApplyContext, firewall_id: i64, id: i64) -> Result<ReadOutcome> {
        let device = found(
            self.provider
                .client
                .get_firewall_device(&ctx.cancel, firewall_id, id),
        )
        .with_context(|| format!("failed to read device {id} of firewall {firewall_id}"))?;
        Ok(device.map_or(ReadOutcome::Gone, |d| {
            ReadOutcome::Found(Self::flatten(firewall_id, &d))
        }))
    }
}

impl Reconciler for FirewallDeviceResource {
    fn type_name(&self) -> &'static str {
        "linode_firewall_device"
    }

    fn model(&self) -> &Schema {
        &self.schema
    }

    fn create(&self, ctx: &mut ApplyContext, planned: &State) -> Result<State> {
        let firewall_id = planned.require_int("firewall_id")?;
        let opts = FirewallDeviceCreateOptions {
            id: planned.require_int("entity_id")?,
            entity_type: planned.str("entity_type").unwrap_or("linode").to_string(),
        };
        let device = self
            .provider
            .client
            .create_firewall_device(&ctx.cancel, firewall_id, &opts)
            .with_context(|| {
                format!(
                    "failed to attach {} {} to firewall {firewall_id}",
                    opts.entity_type, opts.id
                )
            })?;
        let state = Self::flatten(firewall_id, &device);
        ctx.checkpoint(&state);
        log::info!(
            "Attached {} {} to firewall {firewall_id} as device {}",
            opts.entity_type,
            opts.id,
            device.id
        );
        Ok(state)
    }

    fn read(&self, ctx: &mut ApplyContext, prior: &State) -> Result<ReadOutcome> {
        let firewall_id = prior.require_int("firewall_id")?;
        self.fetch(ctx, firewall_id, prior.numeric_id()?)
    }

    fn update(
        &self,
        ctx: &mut ApplyContext,
        prior: &State,
        _planned: &State,
        changes: &ChangeSet,
    ) -> Result<State> {
        if changes.any_update() {
            ctx.warn("firewall devices cannot be updated in place; no changes were made");
        }
        Ok(prior.clone())
    }

    fn delete(&self, ctx: &mut ApplyContext, prior: &State) -> Result<()> {
        let firewall_id = prior.require_int("firewall_id")?;
        let id = prior.numeric_id()?;
        deleted(
            self.provider
                .client
                .delete_firewall_device(&ctx.cancel, firewall_id, id),
            &format!("device {id} of firewall {firewall_id}"),
        )
        .with_context(|| format!("failed to detach device {id} from firewall {firewall_id}"))
    }

    /// Import ID format: `firewall_id,device_id`.
    fn import(&self, ctx: &mut ApplyContext, id: &str) -> Result<ReadOutcome> {
        let parts = parse_import_id(id, &["firewall_id", "id"])?;
        let firewall_id = parse_id(&parts[0], "firewall_id")?;
        let device_id = parse_id(&parts[1], "id")?;
        self.fetch(ctx, firewall_id, device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{ctx, provider};
    use linode_api::types::{FirewallCreateOptions, FirewallRuleSet};
    use linode_api::{CancelToken, CloudClient, MockClient};
    use reconcile::diff::{self, Action};

    fn setup() -> (MockClient, FirewallDeviceResource) {
        let mock = MockClient::new();
        mock.add_instance(100, "running");
        mock.create_firewall(
            &CancelToken::new(),
            &FirewallCreateOptions {
                label: "edge".to_string(),
                rules: FirewallRuleSet {
                    inbound_policy: "DROP".to_string(),
                    outbound_policy: "ACCEPT".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .unwrap();
        let r = FirewallDeviceResource::new(provider(&mock));
        (mock, r)
    }

    fn config() -> State {
        State::new().with("firewall_id", 1).with("entity_id", 100)
    }

    #[test]
    fn test_attach_and_read() {
        let (mock, r) = setup();
        let planned = diff::plan(r.model(), None, Some(&config())).planned.unwrap();
        assert_eq!(planned.str("entity_type"), Some("linode"));

        let state = r.create(&mut ctx(), &planned).unwrap();
        assert_eq!(state.str("id"), Some("2"));
        assert_eq!(mock.devices(1).len(), 1);

        let read = r.read(&mut ctx(), &state).unwrap().into_state().unwrap();
        assert_eq!(read, state);
        let replan = diff::plan(r.model(), Some(&read), Some(&config()));
        assert_eq!(replan.changes.action, Action::NoOp);
    }

    #[test]
    fn test_changing_entity_replaces() {
        let (_mock, r) = setup();
        let planned = diff::plan(r.model(), None, Some(&config())).planned.unwrap();
        let state = r.create(&mut ctx(), &planned).unwrap();
        let plan = diff::plan(r.model(), Some(&state), Some(&config().with("entity_id", 101)));
        assert_eq!(plan.changes.action, Action::Replace);
        assert_eq!(plan.changes.replaced(), vec!["entity_id"]);
    }

    #[test]
    fn test_import_and_detach() {
        let (mock, r) = setup();
        let planned = diff::plan(r.model(), None, Some(&config())).planned.unwrap();
        let state = r.create(&mut ctx(), &planned).unwrap();

        let imported = r.import(&mut ctx(), "1,2").unwrap().into_state().unwrap();
        assert_eq!(imported, state);
        assert!(r.import(&mut ctx(), "1").is_err());

        r.delete(&mut ctx(), &state).unwrap();
        assert!(mock.devices(1).is_empty());
        assert!(r.read(&mut ctx(), &state).unwrap().is_gone());
        // Already detached.
        r.delete(&mut ctx(), &state).unwrap();
    }

    #[test]
    fn test_duplicate_attach_fails() {
        let (_mock, r) = setup();
        let planned = diff::plan(r.model(), None, Some(&config())).planned.unwrap();
        r.create(&mut ctx(), &planned).unwrap();
        let err = r.create(&mut ctx(), &planned).unwrap_err();
        assert!(format!("{err:#}").contains("failed to attach linode 100 to firewall 1"));
    }
}
