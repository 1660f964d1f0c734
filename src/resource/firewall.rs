use super::{found, opt_string, opt_string_set, timestamp};
use crate::provider::Provider;
use anyhow::{Context, Result, anyhow};
use linode_api::types::{
    DevicesCreationOptions, Firewall, FirewallCreateOptions, FirewallDevice,
    FirewallDeviceCreateOptions, FirewallRule, FirewallRuleSet, FirewallUpdateOptions,
    NetworkAddresses,
};
use reconcile::{
    ApplyContext, Attribute, ChangeSet, Kind, ReadOutcome, Reconciler, Schema, SemanticEq,
    SetDelta, State, Validator, Value, reconcile_set,
};
use std::collections::{BTreeMap, BTreeSet};

const BASE_FIELDS: &[&str] = &["label", "tags", "disabled"];
const RULE_FIELDS: &[&str] = &["inbound", "outbound", "inbound_policy", "outbound_policy"];
const DEVICE_FIELDS: &[&str] = &["linodes", "nodebalancers"];

const POLICIES: &[&str] = &["ACCEPT", "DROP"];

/// A device attachment's natural key: `(entity_id, type)`.
type DeviceKey = (i64, String);

fn rule_attributes() -> Vec<Attribute> {
    vec![
        Attribute::required("label", Kind::String).validate(Validator::LengthBetween(3, 32)),
        Attribute::required("action", Kind::String).validate(Validator::OneOf(POLICIES)),
        Attribute::required("protocol", Kind::String)
            .validate(Validator::OneOf(&["TCP", "UDP", "ICMP", "IPENCAP"])),
        Attribute::optional("ports", Kind::String),
        Attribute::optional("ipv4", Kind::string_list()).semantic(SemanticEq::Cidr),
        Attribute::optional("ipv6", Kind::string_list()).semantic(SemanticEq::Cidr),
    ]
}

fn object<const N: usize>(fields: [(&str, Value); N]) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

fn flatten_addresses(addresses: Option<&Vec<String>>) -> Value {
    match addresses {
        Some(list) if !list.is_empty() => Value::string_list(list.iter().cloned()),
        _ => Value::Null,
    }
}

fn flatten_rules(rules: &[FirewallRule]) -> Value {
    if rules.is_empty() {
        return Value::Null;
    }
    Value::List(
        rules
            .iter()
            .map(|rule| {
                object([
                    ("label", opt_string(&rule.label)),
                    ("action", Value::from(rule.action.as_str())),
                    ("protocol", Value::from(rule.protocol.as_str())),
                    ("ports", opt_string(rule.ports.as_deref().unwrap_or_default())),
                    ("ipv4", flatten_addresses(rule.addresses.ipv4.as_ref())),
                    ("ipv6", flatten_addresses(rule.addresses.ipv6.as_ref())),
                ])
            })
            .collect(),
    )
}

fn expand_rules(value: &Value, direction: &str) -> Result<Vec<FirewallRule>> {
    let Some(items) = value.elements() else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let fields = item
                .as_object()
                .ok_or_else(|| anyhow!("{direction}.{i} is not an object"))?;
            let text = |name: &str| fields.get(name).and_then(Value::as_str);
            let require = |name: &str| {
                text(name)
                    .map(ToString::to_string)
                    .ok_or_else(|| anyhow!("{direction}.{i}.{name} is required"))
            };
            let addresses = |name: &str| {
                fields.get(name).and_then(Value::elements).map(|list| {
                    list.iter()
                        .filter_map(Value::as_str)
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                })
            };
            Ok(FirewallRule {
                action: require("action")?,
                label: require("label")?,
                description: None,
                ports: text("ports").map(ToString::to_string),
                protocol: require("protocol")?,
                addresses: NetworkAddresses {
                    ipv4: addresses("ipv4"),
                    ipv6: addresses("ipv6"),
                },
            })
        })
        .collect()
}

fn expand_rule_set(planned: &State) -> Result<FirewallRuleSet> {
    Ok(FirewallRuleSet {
        inbound: expand_rules(planned.get("inbound"), "inbound")?,
        inbound_policy: planned.require_str("inbound_policy")?.to_string(),
        outbound: expand_rules(planned.get("outbound"), "outbound")?,
        outbound_policy: planned.require_str("outbound_policy")?.to_string(),
    })
}

/// Desired device keys from the `linodes` and `nodebalancers` sets.
fn desired_devices(planned: &State) -> BTreeSet<DeviceKey> {
    let linodes = planned
        .ints("linodes")
        .into_iter()
        .map(|id| (id, "linode".to_string()));
    let nodebalancers = planned
        .ints("nodebalancers")
        .into_iter()
        .map(|id| (id, "nodebalancer".to_string()));
    linodes.chain(nodebalancers).collect()
}

/// `linode_firewall`: a Cloud Firewall with its rules and attachments.
#[derive(Debug)]
pub struct FirewallResource {
    provider: Provider,
    schema: Schema,
}

impl FirewallResource {
    pub fn new(provider: Provider) -> Self {
        let schema = Schema::new("linode_firewall", "A Linode Cloud Firewall")
            .attr(Attribute::computed("id", Kind::String))
            .attr(
                Attribute::required("label", Kind::String)
                    .validate(Validator::LengthBetween(3, 32))
                    .validate(Validator::Matches(r"^[A-Za-z0-9._-]+$")),
            )
            .attr(
                Attribute::optional("tags", Kind::string_set())
                    .semantic(SemanticEq::CaseInsensitiveSet),
            )
            .attr(Attribute::optional("disabled", Kind::Bool).default(false))
            .attr(Attribute::optional("inbound", Kind::object_list()).nested(rule_attributes()))
            .attr(Attribute::optional("outbound", Kind::object_list()).nested(rule_attributes()))
            .attr(
                Attribute::required("inbound_policy", Kind::String)
                    .validate(Validator::OneOf(POLICIES)),
            )
            .attr(
                Attribute::required("outbound_policy", Kind::String)
                    .validate(Validator::OneOf(POLICIES)),
            )
            .attr(Attribute::optional("linodes", Kind::int_set()))
            .attr(Attribute::optional("nodebalancers", Kind::int_set()))
            .attr(Attribute::computed("devices", Kind::object_list()).nested(vec![
                Attribute::computed("id", Kind::Int),
                Attribute::computed("entity_id", Kind::Int),
                Attribute::computed("type", Kind::String),
                Attribute::computed("label", Kind::String),
                Attribute::computed("url", Kind::String),
            ]))
            .attr(Attribute::computed("status", Kind::String))
            .attr(Attribute::computed("created", Kind::String))
            .attr(Attribute::computed("updated", Kind::String));
        Self { provider, schema }
    }

    fn flatten(firewall: &Firewall, devices: &[FirewallDevice]) -> State {
        let mut devices: Vec<&FirewallDevice> = devices.iter().collect();
        devices.sort_by_key(|d| d.id);
        let ids_of = |entity_type: &str| {
            let ids: Vec<i64> = devices
                .iter()
                .filter(|d| d.entity.entity_type == entity_type)
                .map(|d| d.entity.id)
                .collect();
            if ids.is_empty() {
                Value::Null
            } else {
                Value::int_set(ids)
            }
        };
        let device_list = Value::List(
            devices
                .iter()
                .map(|d| {
                    object([
                        ("id", Value::Int(d.id)),
                        ("entity_id", Value::Int(d.entity.id)),
                        ("type", Value::from(d.entity.entity_type.as_str())),
                        ("label", Value::from(d.entity.label.as_str())),
                        ("url", Value::from(d.entity.url.as_str())),
                    ])
                })
                .collect(),
        );

        State::new()
            .with("id", firewall.id.to_string())
            .with("label", firewall.label.as_str())
            .with("tags", opt_string_set(&firewall.tags))
            .with("disabled", firewall.status == "disabled")
            .with("inbound", flatten_rules(&firewall.rules.inbound))
            .with("outbound", flatten_rules(&firewall.rules.outbound))
            .with("inbound_policy", firewall.rules.inbound_policy.as_str())
            .with("outbound_policy", firewall.rules.outbound_policy.as_str())
            .with("linodes", ids_of("linode"))
            .with("nodebalancers", ids_of("nodebalancer"))
            .with("devices", device_list)
            .with("status", firewall.status.as_str())
            .with("created", timestamp(firewall.created.as_ref()))
            .with("updated", timestamp(firewall.updated.as_ref()))
    }

    fn fetch(&self, ctx: &ApplyContext, id: i64) -> Result<Option<State>> {
        let client = &self.provider.client;
        let Some(firewall) = found(client.get_firewall(&ctx.cancel, id))
            .with_context(|| format!("failed to read firewall {id}"))?
        else {
            return Ok(None);
        };
        let devices = client
            .list_firewall_devices(&ctx.cancel, id)
            .with_context(|| format!("failed to list devices of firewall {id}"))?;
        Ok(Some(Self::flatten(&firewall, &devices)))
    }

    fn refetch(&self, ctx: &ApplyContext, id: i64) -> Result<State> {
        self.fetch(ctx, id)?
            .ok_or_else(|| anyhow!("firewall {id} disappeared while being updated"))
    }

    fn set_disabled(&self, ctx: &ApplyContext, id: i64, disabled: bool) -> Result<()> {
        let status = if disabled { "disabled" } else { "enabled" };
        self.provider
            .client
            .update_firewall(
                &ctx.cancel,
                id,
                &FirewallUpdateOptions {
                    status: Some(status.to_string()),
                    ..Default::default()
                },
            )
            .with_context(|| format!("failed to set firewall {id} {status}"))?;
        Ok(())
    }

    fn update_base(
        &self,
        ctx: &ApplyContext,
        id: i64,
        planned: &State,
        changes: &ChangeSet,
    ) -> Result<()> {
        let mut opts = FirewallUpdateOptions::default();
        if changes.changed("label") {
            opts.label = Some(planned.require_str("label")?.to_string());
        }
        if changes.changed("tags") {
            opts.tags = Some(planned.strings("tags"));
        }
        if changes.changed("disabled") {
            let disabled = planned.bool("disabled").unwrap_or(false);
            opts.status = Some(if disabled { "disabled" } else { "enabled" }.to_string());
        }
        if opts.is_empty() {
            return Ok(());
        }
        log::debug!("Updating firewall {id}: {opts:?}");
        self.provider
            .client
            .update_firewall(&ctx.cancel, id, &opts)
            .with_context(|| format!("failed to update firewall {id}"))?;
        Ok(())
    }

    fn update_rules(&self, ctx: &ApplyContext, id: i64, planned: &State) -> Result<()> {
        let rules = expand_rule_set(planned)?;
        log::debug!(
            "Replacing rules of firewall {id}: {} inbound, {} outbound",
            rules.inbound.len(),
            rules.outbound.len()
        );
        self.provider
            .client
            .update_firewall_rules(&ctx.cancel, id, &rules)
            .with_context(|| format!("failed to update rules of firewall {id}"))?;
        Ok(())
    }

    /// Reconcile attachments: detach what is no longer wanted, then attach
    /// what is missing.
    fn update_devices(&self, ctx: &ApplyContext, id: i64, planned: &State) -> Result<()> {
        let client = &self.provider.client;
        let current: BTreeMap<DeviceKey, i64> = client
            .list_firewall_devices(&ctx.cancel, id)
            .with_context(|| format!("failed to list devices of firewall {id}"))?
            .into_iter()
            .map(|d| ((d.entity.id, d.entity.entity_type), d.id))
            .collect();
        let desired = desired_devices(planned);
        let delta = SetDelta::between(current.keys(), desired.iter());
        if delta.is_empty() {
            return Ok(());
        }

        reconcile_set(
            &delta,
            |key| {
                let device_id = current[key];
                log::info!("Detaching {} {} from firewall {id}", key.1, key.0);
                super::deleted(
                    client.delete_firewall_device(&ctx.cancel, id, device_id),
                    &format!("device {device_id} of firewall {id}"),
                )
                .with_context(|| format!("failed to detach {} {} from firewall {id}", key.1, key.0))
            },
            |key| {
                log::info!("Attaching {} {} to firewall {id}", key.1, key.0);
                client
                    .create_firewall_device(
                        &ctx.cancel,
                        id,
                        &FirewallDeviceCreateOptions {
                            id: key.0,
                            entity_type: key.1.clone(),
                        },
                    )
                    .with_context(|| {
                        format!("failed to attach {} {} to firewall {id}", key.1, key.0)
                    })?;
                Ok(())
            },
        )
    }
}

impl Reconciler for FirewallResource {
    fn type_name(&self) -> &'static str {
        "linode_firewall"
    }

    fn model(&self) -> &Schema {
        &self.schema
    }

    fn create(&self, ctx: &mut ApplyContext, planned: &State) -> Result<State> {
        let opts = FirewallCreateOptions {
            label: planned.require_str("label")?.to_string(),
            rules: expand_rule_set(planned)?,
            tags: planned.strings("tags"),
            devices: DevicesCreationOptions {
                linodes: planned.ints("linodes"),
                nodebalancers: planned.ints("nodebalancers"),
            },
        };
        let firewall = self
            .provider
            .client
            .create_firewall(&ctx.cancel, &opts)
            .with_context(|| format!("failed to create firewall {}", opts.label))?;
        let id = firewall.id;
        ctx.checkpoint(&Self::flatten(&firewall, &[]));
        log::info!("Created firewall {} ({id})", firewall.label);

        if planned.bool("disabled") == Some(true) {
            self.set_disabled(ctx, id, true)?;
        }
        self.refetch(ctx, id)
    }

    fn read(&self, ctx: &mut ApplyContext, prior: &State) -> Result<ReadOutcome> {
        let id = prior.numeric_id()?;
        Ok(self
            .fetch(ctx, id)?
            .map_or(ReadOutcome::Gone, ReadOutcome::Found))
    }

    /// Base fields, rules and attachments are separate endpoints; each is
    /// called only when its own attributes changed.
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
        let id = prior.numeric_id()?;
        if changes.any_changed(BASE_FIELDS) {
            self.update_base(ctx, id, planned, changes)?;
        }
        if changes.any_changed(RULE_FIELDS) {
            self.update_rules(ctx, id, planned)?;
        }
        if changes.any_changed(DEVICE_FIELDS) {
            self.update_devices(ctx, id, planned)?;
        }
        self.refetch(ctx, id)
    }

    fn delete(&self, ctx: &mut ApplyContext, prior: &State) -> Result<()> {
        let id = prior.numeric_id()?;
        super::deleted(
            self.provider.client.delete_firewall(&ctx.cancel, id),
            &format!("firewall {id}"),
        )
        .with_context(|| format!("failed to delete firewall {id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{ctx, provider};
    use linode_api::MockClient;
    use reconcile::diff::{self, Action, Plan};

    fn rule(label: &str, ports: &str, ipv4: &[&str]) -> Value {
        object([
            ("label", Value::from(label)),
            ("action", Value::from("ACCEPT")),
            ("protocol", Value::from("TCP")),
            ("ports", Value::from(ports)),
            ("ipv4", Value::string_list(ipv4.iter().copied())),
            ("ipv6", Value::Null),
        ])
    }

    fn config() -> State {
        State::new()
            .with("label", "web-fw")
            .with("tags", Value::string_set(["Web"]))
            .with("inbound", Value::List(vec![rule("allow-ssh", "22", &["192.0.2.1/32"])]))
            .with("inbound_policy", "DROP")
            .with("outbound_policy", "ACCEPT")
            .with("linodes", Value::int_set([10, 11]))
    }

    fn setup() -> (MockClient, FirewallResource) {
        let mock = MockClient::new();
        for id in [10, 11, 12] {
            mock.add_instance(id, "running");
        }
        let r = FirewallResource::new(provider(&mock));
        (mock, r)
    }

    fn create(r: &FirewallResource, config: &State) -> State {
        let plan = diff::plan(r.model(), None, Some(config));
        r.create(&mut ctx(), plan.planned.as_ref().unwrap()).unwrap()
    }

    fn plan(r: &FirewallResource, prior: &State, config: &State) -> Plan {
        diff::plan(r.model(), Some(prior), Some(config))
    }

    fn apply(r: &FirewallResource, prior: &State, plan: &Plan) -> State {
        r.update(&mut ctx(), prior, plan.planned.as_ref().unwrap(), &plan.changes)
            .unwrap()
    }

    #[test]
    fn test_create_round_trips() {
        let (mock, r) = setup();
        let mut checkpoints = Vec::new();
        let mut sink = |s: &State| checkpoints.push(s.clone());
        let planned = diff::plan(r.model(), None, Some(&config())).planned.unwrap();
        let state = {
            let mut ctx = ApplyContext::with_checkpoint(linode_api::CancelToken::new(), &mut sink);
            r.create(&mut ctx, &planned).unwrap()
        };
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].str("id"), Some("1"));

        assert_eq!(state.ints("linodes"), vec![10, 11]);
        assert_eq!(state.get("devices").elements().unwrap().len(), 2);
        assert_eq!(mock.devices(1).len(), 2);

        let read = r.read(&mut ctx(), &state).unwrap().into_state().unwrap();
        assert_eq!(read, state);
        assert_eq!(plan(&r, &read, &config()).changes.action, Action::NoOp);
    }

    #[test]
    fn test_create_disabled() {
        let (mock, r) = setup();
        let state = create(&r, &config().with("disabled", true));
        assert_eq!(state.bool("disabled"), Some(true));
        assert_eq!(mock.firewall(1).unwrap().status, "disabled");
    }

    #[test]
    fn test_equivalent_cidr_and_tag_case_are_noop() {
        let (_mock, r) = setup();
        let state = create(&r, &config());
        let respelled = config()
            .with("tags", Value::string_set(["web"]))
            .with("inbound", Value::List(vec![rule("allow-ssh", "22", &["192.0.2.1"])]));
        assert_eq!(plan(&r, &state, &respelled).changes.action, Action::NoOp);
    }

    #[test]
    fn test_rule_change_hits_only_rules_endpoint() {
        let (mock, r) = setup();
        let state = create(&r, &config());
        let changed = config().with(
            "inbound",
            Value::List(vec![
                rule("allow-ssh", "22", &["192.0.2.1/32"]),
                rule("allow-https", "443", &["0.0.0.0/0"]),
            ]),
        );
        let plan = plan(&r, &state, &changed);
        assert_eq!(plan.changes.action, Action::Update);

        mock.clear_calls();
        let after = apply(&r, &state, &plan);
        assert_eq!(mock.mutating_calls(), vec!["PUT /networking/firewalls/1/rules"]);
        assert_eq!(after.get("inbound").elements().unwrap().len(), 2);
        assert_eq!(mock.firewall(1).unwrap().rules.inbound.len(), 2);
    }

    #[test]
    fn test_device_set_removes_before_adding() {
        let (mock, r) = setup();
        let state = create(&r, &config());
        let detached_id = mock
            .devices(1)
            .into_iter()
            .find(|d| d.entity.id == 10)
            .unwrap()
            .id;

        let plan = plan(&r, &state, &config().with("linodes", Value::int_set([11, 12])));
        mock.clear_calls();
        let after = apply(&r, &state, &plan);
        assert_eq!(
            mock.mutating_calls(),
            vec![
                format!("DELETE /networking/firewalls/1/devices/{detached_id}"),
                "POST /networking/firewalls/1/devices".to_string(),
            ]
        );
        assert_eq!(after.ints("linodes"), vec![11, 12]);
    }

    #[test]
    fn test_base_update_and_disable() {
        let (mock, r) = setup();
        let state = create(&r, &config());
        let plan = plan(&r, &state, &config().with("label", "web-fw-2").with("disabled", true));
        mock.clear_calls();
        let after = apply(&r, &state, &plan);
        assert_eq!(mock.mutating_calls(), vec!["PUT /networking/firewalls/1"]);
        assert_eq!(after.str("label"), Some("web-fw-2"));
        assert_eq!(after.str("status"), Some("disabled"));
    }

    #[test]
    fn test_partial_failure_is_not_rolled_back() {
        let (mock, r) = setup();
        let state = create(&r, &config());
        let plan = plan(&r, &state, &config().with("linodes", Value::int_set([12])));
        mock.fail_next("POST /networking/firewalls/1/devices", 500);
        let err = r
            .update(&mut ctx(), &state, plan.planned.as_ref().unwrap(), &plan.changes)
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to attach linode 12"));
        // Both detachments happened and stay done.
        assert!(mock.devices(1).is_empty());
    }

    #[test]
    fn test_external_delete() {
        let (mock, r) = setup();
        let state = create(&r, &config());
        mock.remove_firewall(1);
        assert!(r.read(&mut ctx(), &state).unwrap().is_gone());
        r.delete(&mut ctx(), &state).unwrap();
    }
}
