use super::{deleted, found, opt_string, opt_string_set};
use crate::provider::Provider;
use anyhow::{Context, Result};
use linode_api::types::{Domain, DomainCreateOptions, DomainUpdateOptions};
use reconcile::{
    ApplyContext, Attribute, ChangeSet, Diagnostics, Kind, ReadOutcome, Reconciler, Schema,
    SemanticEq, State, Validator,
};

const TTL_FIELDS: [&str; 4] = ["ttl_sec", "retry_sec", "expire_sec", "refresh_sec"];

/// `linode_domain`: a DNS zone.
#[derive(Debug)]
pub struct DomainResource {
    provider: Provider,
    schema: Schema,
}

impl DomainResource {
    pub fn new(provider: Provider) -> Self {
        let mut schema = Schema::new("linode_domain", "A DNS zone hosted by Linode")
            .attr(Attribute::computed("id", Kind::String))
            .attr(
                Attribute::required("domain", Kind::String)
                    .force_replace()
                    .describe("The zone name, e.g. example.com"),
            )
            .attr(
                Attribute::required("type", Kind::String)
                    .force_replace()
                    .validate(Validator::OneOf(&["master", "slave"])),
            )
            .attr(
                Attribute::optional("group", Kind::String)
                    .validate(Validator::LengthBetween(0, 50)),
            )
            .attr(
                Attribute::optional("status", Kind::String)
                    .default("active")
                    .validate(Validator::OneOf(&["active", "disabled", "edit_mode"])),
            )
            .attr(
                Attribute::optional("description", Kind::String)
                    .validate(Validator::LengthBetween(0, 253)),
            )
            .attr(
                Attribute::optional("master_ips", Kind::string_set())
                    .validate(Validator::IpAddress),
            )
            .attr(
                Attribute::optional("axfr_ips", Kind::string_set())
                    .validate(Validator::IpAddress),
            )
            .attr(
                Attribute::optional("tags", Kind::string_set())
                    .semantic(SemanticEq::CaseInsensitiveSet),
            )
            .attr(
                Attribute::optional("soa_email", Kind::String)
                    .describe("Start of Authority email; required for master zones"),
            );
        for name in TTL_FIELDS {
            schema = schema.attr(
                Attribute::optional_computed(name, Kind::Int).semantic(SemanticEq::RoundedTtl),
            );
        }
        Self { provider, schema }
    }

    fn flatten(domain: &Domain) -> State {
        State::new()
            .with("id", domain.id.to_string())
            .with("domain", domain.domain.as_str())
            .with("type", domain.domain_type.as_str())
            .with("group", opt_string(&domain.group))
            .with("status", domain.status.as_str())
            .with("description", opt_string(&domain.description))
            .with("master_ips", opt_string_set(&domain.master_ips))
            .with("axfr_ips", opt_string_set(&domain.axfr_ips))
            .with("tags", opt_string_set(&domain.tags))
            .with("soa_email", opt_string(&domain.soa_email))
            .with("ttl_sec", domain.ttl_sec)
            .with("retry_sec", domain.retry_sec)
            .with("expire_sec", domain.expire_sec)
            .with("refresh_sec", domain.refresh_sec)
    }

    fn create_options(planned: &State) -> Result<DomainCreateOptions> {
        let owned = |name: &str| planned.str(name).map(ToString::to_string);
        Ok(DomainCreateOptions {
            domain: planned.require_str("domain")?.to_string(),
            domain_type: planned.require_str("type")?.to_string(),
            group: owned("group"),
            status: owned("status"),
            description: owned("description"),
            soa_email: owned("soa_email"),
            master_ips: planned.strings("master_ips"),
            axfr_ips: planned.strings("axfr_ips"),
            tags: planned.strings("tags"),
            ttl_sec: planned.int("ttl_sec"),
            retry_sec: planned.int("retry_sec"),
            expire_sec: planned.int("expire_sec"),
            refresh_sec: planned.int("refresh_sec"),
        })
    }

    /// Only the attributes that changed; cleared strings and sets are sent
    /// empty.
    fn update_options(planned: &State, changes: &ChangeSet) -> DomainUpdateOptions {
        let string = |name: &str| {
            changes
                .changed(name)
                .then(|| planned.str(name).unwrap_or_default().to_string())
        };
        let strings = |name: &str| changes.changed(name).then(|| planned.strings(name));
        let int = |name: &str| {
            if changes.changed(name) {
                planned.int(name)
            } else {
                None
            }
        };
        DomainUpdateOptions {
            group: string("group"),
            status: string("status"),
            description: string("description"),
            soa_email: string("soa_email"),
            master_ips: strings("master_ips"),
            axfr_ips: strings("axfr_ips"),
            tags: strings("tags"),
            ttl_sec: int("ttl_sec"),
            retry_sec: int("retry_sec"),
            expire_sec: int("expire_sec"),
            refresh_sec: int("refresh_sec"),
            ..Default::default()
        }
    }
}

impl Reconciler for DomainResource {
    fn type_name(&self) -> &'static str {
        "linode_domain"
    }

    fn model(&self) -> &Schema {
        &self.schema
    }

    fn validate(&self, config: &State, diags: &mut Diagnostics) {
        match config.str("type") {
            Some("master") if config.get("soa_email").is_null() => {
                diags.error_at("soa_email", "soa_email is required for master zones");
            }
            Some("slave") if config.get("master_ips").is_null() => {
                diags.error_at("master_ips", "master_ips is required for slave zones");
            }
            _ => {}
        }
    }

    fn create(&self, ctx: &mut ApplyContext, planned: &State) -> Result<State> {
        let opts = Self::create_options(planned)?;
        let domain = self
            .provider
            .client
            .create_domain(&ctx.cancel, &opts)
            .with_context(|| format!("failed to create domain {}", opts.domain))?;
        let state = Self::flatten(&domain);
        ctx.checkpoint(&state);
        log::info!("Created domain {} ({})", domain.domain, domain.id);
        Ok(state)
    }

    fn read(&self, ctx: &mut ApplyContext, prior: &State) -> Result<ReadOutcome> {
        let id = prior.numeric_id()?;
        let domain = found(self.provider.client.get_domain(&ctx.cancel, id))
            .with_context(|| format!("failed to read domain {id}"))?;
        Ok(domain.map_or(ReadOutcome::Gone, |d| ReadOutcome::Found(Self::flatten(&d))))
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
        let id = prior.numeric_id()?;
        let opts = Self::update_options(planned, changes);
        let client = &self.provider.client;
        let domain = if opts.is_empty() {
            client.get_domain(&ctx.cancel, id)
        } else {
            log::debug!("Updating domain {id}: {opts:?}");
            client.update_domain(&ctx.cancel, id, &opts)
        }
        .with_context(|| format!("failed to update domain {id}"))?;
        Ok(Self::flatten(&domain))
    }

    fn delete(&self, ctx: &mut ApplyContext, prior: &State) -> Result<()> {
        let id = prior.numeric_id()?;
        deleted(
            self.provider.client.delete_domain(&ctx.cancel, id),
            &format!("domain {id}"),
        )
        .with_context(|| format!("failed to delete domain {id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{ctx, provider};
    use linode_api::MockClient;
    use reconcile::diff::{self, Action, Change};
    use reconcile::Value;

    fn resource(mock: &MockClient) -> DomainResource {
        DomainResource::new(provider(mock))
    }

    fn config() -> State {
        State::new()
            .with("domain", "example.com")
            .with("type", "master")
            .with("soa_email", "admin@example.com")
            .with("ttl_sec", 299)
            .with("tags", Value::string_set(["Prod"]))
    }

    fn create(r: &DomainResource, config: &State) -> State {
        let plan = diff::plan(r.model(), None, Some(config));
        r.create(&mut ctx(), plan.planned.as_ref().unwrap()).unwrap()
    }

    #[test]
    fn test_create_rounds_ttl_and_round_trips() {
        let mock = MockClient::new();
        let r = resource(&mock);

        let plan = diff::plan(r.model(), None, Some(&config()));
        assert_eq!(plan.diagnostics.len(), 1);
        let planned = plan.planned.unwrap();
        assert_eq!(planned.int("ttl_sec"), Some(300));
        assert_eq!(planned.str("status"), Some("active"));

        let state = r.create(&mut ctx(), &planned).unwrap();
        assert_eq!(state.str("id"), Some("1"));
        assert_eq!(mock.domain(1).unwrap().ttl_sec, 300);

        let read = r.read(&mut ctx(), &state).unwrap().into_state().unwrap();
        assert_eq!(read, state);

        let replan = diff::plan(r.model(), Some(&read), Some(&config()));
        assert_eq!(replan.changes.action, Action::NoOp);
        assert!(
            replan
                .changes
                .attributes
                .values()
                .all(|c| *c == Change::Unchanged)
        );
    }

    #[test]
    fn test_noop_update_makes_no_calls() {
        let mock = MockClient::new();
        let r = resource(&mock);
        let state = create(&r, &config());
        mock.clear_calls();

        let tags_recased = config().with("tags", Value::string_set(["prod"]));
        let plan = diff::plan(r.model(), Some(&state), Some(&tags_recased));
        assert_eq!(plan.changes.action, Action::NoOp);
        let after = r
            .update(&mut ctx(), &state, plan.planned.as_ref().unwrap(), &plan.changes)
            .unwrap();
        assert_eq!(after, state);
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_update_sends_only_changes() {
        let mock = MockClient::new();
        let r = resource(&mock);
        let state = create(&r, &config());

        let changed = config().with("description", "main zone").with("ttl_sec", 3601);
        let plan = diff::plan(r.model(), Some(&state), Some(&changed));
        assert_eq!(plan.changes.action, Action::Update);

        let opts = DomainResource::update_options(plan.planned.as_ref().unwrap(), &plan.changes);
        assert_eq!(
            opts,
            DomainUpdateOptions {
                description: Some("main zone".to_string()),
                ttl_sec: Some(7200),
                ..Default::default()
            }
        );

        let after = r
            .update(&mut ctx(), &state, plan.planned.as_ref().unwrap(), &plan.changes)
            .unwrap();
        assert_eq!(after.str("description"), Some("main zone"));
        assert_eq!(after.int("ttl_sec"), Some(7200));
    }

    #[test]
    fn test_clearing_optional_string_sends_empty() {
        let mock = MockClient::new();
        let r = resource(&mock);
        let state = create(&r, &config().with("group", "web"));
        let plan = diff::plan(r.model(), Some(&state), Some(&config()));
        let after = r
            .update(&mut ctx(), &state, plan.planned.as_ref().unwrap(), &plan.changes)
            .unwrap();
        assert!(after.get("group").is_null());
        assert_eq!(mock.domain(1).unwrap().group, "");
    }

    #[test]
    fn test_read_gone_after_external_delete() {
        let mock = MockClient::new();
        let r = resource(&mock);
        let state = create(&r, &config());
        mock.remove_domain(1);
        assert!(r.read(&mut ctx(), &state).unwrap().is_gone());
        // Delete of a missing zone succeeds.
        r.delete(&mut ctx(), &state).unwrap();
    }

    #[test]
    fn test_delete_surfaces_other_errors() {
        let mock = MockClient::new();
        let r = resource(&mock);
        let state = create(&r, &config());
        mock.fail_next("DELETE /domains/1", 500);
        let err = r.delete(&mut ctx(), &state).unwrap_err();
        assert!(format!("{err:#}").contains("failed to delete domain 1"));
    }

    #[test]
    fn test_validate_zone_type_requirements() {
        let r = resource(&MockClient::new());
        let mut diags = Diagnostics::new();
        r.validate(&State::new().with("domain", "a.com").with("type", "master"), &mut diags);
        r.validate(&State::new().with("domain", "a.com").with("type", "slave"), &mut diags);
        let attrs: Vec<_> = diags.iter().filter_map(|d| d.attribute.clone()).collect();
        assert_eq!(attrs, vec!["soa_email", "master_ips"]);
    }
}
