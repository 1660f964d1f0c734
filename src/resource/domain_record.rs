use super::{deleted, found, opt_string};
use crate::provider::Provider;
use anyhow::{Context, Result};
use linode_api::types::{DomainRecord, DomainRecordCreateOptions, DomainRecordUpdateOptions};
use reconcile::resource::{parse_id, parse_import_id};
use reconcile::{
    ApplyContext, Attribute, ChangeSet, Diagnostics, Kind, Plan, ReadOutcome, Reconciler, Schema,
    SemanticEq, State, Validator,
};

const RECORD_TYPES: &[&str] = &["A", "AAAA", "NS", "MX", "CNAME", "TXT", "SRV", "PTR", "CAA"];

/// Whether a configured record name and the API's relative name refer to
/// the same record. The API strips the zone suffix, and stores the apex as
/// an empty name.
fn names_equivalent(configured: &str, actual: &str, zone: &str) -> bool {
    configured == actual
        || (actual.is_empty() && configured == zone)
        || configured
            .strip_suffix(zone)
            .and_then(|n| n.strip_suffix('.'))
            .is_some_and(|n| n == actual)
}

/// `linode_domain_record`: one record inside a zone.
#[derive(Debug)]
pub struct DomainRecordResource {
    provider: Provider,
    schema: Schema,
}

impl DomainRecordResource {
    pub fn new(provider: Provider) -> Self {
        let schema = Schema::new("linode_domain_record", "A record inside a Linode DNS zone")
            .attr(Attribute::computed("id", Kind::String))
            .attr(Attribute::required("domain_id", Kind::Int).force_replace())
            .attr(
                Attribute::optional_computed("name", Kind::String)
                    .validate(Validator::LengthBetween(0, 100))
                    .describe("Relative or fully-qualified record name"),
            )
            .attr(
                Attribute::required("record_type", Kind::String)
                    .force_replace()
                    .validate(Validator::OneOf(RECORD_TYPES)),
            )
            .attr(
                Attribute::optional_computed("ttl_sec", Kind::Int)
                    .semantic(SemanticEq::RoundedTtl),
            )
            .attr(
                Attribute::required("target", Kind::String)
                    .semantic(SemanticEq::DnsRecordTarget)
                    .validate(Validator::LengthBetween(0, 65535)),
            )
            .attr(
                Attribute::optional_computed("priority", Kind::Int)
                    .validate(Validator::Between(0, 255)),
            )
            .attr(
                Attribute::optional_computed("weight", Kind::Int)
                    .validate(Validator::Between(0, 65535)),
            )
            .attr(
                Attribute::optional_computed("port", Kind::Int)
                    .validate(Validator::Between(0, 65535)),
            )
            .attr(Attribute::optional("protocol", Kind::String))
            .attr(Attribute::optional("service", Kind::String))
            .attr(
                Attribute::optional("tag", Kind::String)
                    .validate(Validator::OneOf(&["issue", "issuewild", "iodef"])),
            );
        Self { provider, schema }
    }

    fn flatten(domain_id: i64, record: &DomainRecord) -> State {
        let optional = |v: &Option<String>| opt_string(v.as_deref().unwrap_or_default());
        State::new()
            .with("id", record.id.to_string())
            .with("domain_id", domain_id)
            .with("name", record.name.as_str())
            .with("record_type", record.record_type.as_str())
            .with("ttl_sec", record.ttl_sec)
            .with("target", record.target.as_str())
            .with("priority", record.priority)
            .with("weight", record.weight)
            .with("port", record.port)
            .with("protocol", optional(&record.protocol))
            .with("service", optional(&record.service))
            .with("tag", optional(&record.tag))
    }

    fn create_options(planned: &State) -> Result<DomainRecordCreateOptions> {
        let owned = |name: &str| planned.str(name).map(ToString::to_string);
        Ok(DomainRecordCreateOptions {
            record_type: planned.require_str("record_type")?.to_string(),
            name: owned("name"),
            target: planned.require_str("target")?.to_string(),
            priority: planned.int("priority"),
            weight: planned.int("weight"),
            port: planned.int("port"),
            service: owned("service"),
            protocol: owned("protocol"),
            ttl_sec: planned.int("ttl_sec"),
            tag: owned("tag"),
        })
    }

    fn update_options(planned: &State, changes: &ChangeSet) -> DomainRecordUpdateOptions {
        let string = |name: &str| {
            changes
                .changed(name)
                .then(|| planned.str(name).unwrap_or_default().to_string())
        };
        let int = |name: &str| changes.changed(name).then(|| planned.int(name)).flatten();
        DomainRecordUpdateOptions {
            name: string("name"),
            target: string("target"),
            priority: int("priority"),
            weight: int("weight"),
            port: int("port"),
            service: string("service"),
            protocol: string("protocol"),
            ttl_sec: int("ttl_sec"),
            tag: string("tag"),
        }
    }

    /// Keep `known`'s spelling of `name` and `target` when the API's
    /// spelling means the same record.
    fn keep_known(&self, ctx: &ApplyContext, known: &State, mut state: State) -> Result<State> {
        let target = known.get("target");
        if target.is_concrete()
            && target != state.get("target")
            && SemanticEq::DnsRecordTarget
                .compare(state.get("target"), target)
                .is_equal()
        {
            state.set("target", target.clone());
        }

        if let (Some(configured), Some(actual)) = (known.str("name"), state.str("name"))
            && configured != actual
        {
            let zone = self.zone(ctx, state.require_int("domain_id")?)?;
            if names_equivalent(configured, actual, &zone) {
                state.set("name", configured);
            }
        }
        Ok(state)
    }

    fn zone(&self, ctx: &ApplyContext, domain_id: i64) -> Result<String> {
        let domain = self
            .provider
            .client
            .get_domain(&ctx.cancel, domain_id)
            .with_context(|| format!("failed to read domain {domain_id}"))?;
        Ok(domain.domain)
    }
}

impl Reconciler for DomainRecordResource {
    fn type_name(&self) -> &'static str {
        "linode_domain_record"
    }

    fn model(&self) -> &Schema {
        &self.schema
    }

    fn validate(&self, config: &State, diags: &mut Diagnostics) {
        match config.str("record_type") {
            Some("SRV") => {
                for name in ["service", "protocol"] {
                    if config.get(name).is_null() {
                        diags.error_at(name, format!("{name} is required for SRV records"));
                    }
                }
            }
            Some("CAA") if config.get("tag").is_null() => {
                diags.error_at("tag", "tag is required for CAA records");
            }
            _ => {}
        }
    }

    /// Suppress name changes that only differ by the zone suffix.
    fn modify_plan(
        &self,
        ctx: &mut ApplyContext,
        prior: Option<&State>,
        plan: &mut Plan,
    ) -> Result<()> {
        let Some(prior) = prior else {
            return Ok(());
        };
        if plan.changes.change("name") != reconcile::Change::Update {
            return Ok(());
        }
        let (Some(configured), Some(actual)) = (
            plan.planned.as_ref().and_then(|p| p.str("name")),
            prior.str("name"),
        ) else {
            return Ok(());
        };
        let zone = self.zone(ctx, prior.require_int("domain_id")?)?;
        if names_equivalent(configured, actual, &zone) {
            log::debug!("Record name {configured:?} matches {actual:?} in zone {zone}");
            plan.suppress("name", prior);
        }
        Ok(())
    }

    fn create(&self, ctx: &mut ApplyContext, planned: &State) -> Result<State> {
        let domain_id = planned.require_int("domain_id")?;
        let opts = Self::create_options(planned)?;
        let record = self
            .provider
            .client
            .create_domain_record(&ctx.cancel, domain_id, &opts)
            .with_context(|| {
                format!("failed to create {} record in domain {domain_id}", opts.record_type)
            })?;
        let state = self.keep_known(ctx, planned, Self::flatten(domain_id, &record))?;
        ctx.checkpoint(&state);
        log::info!(
            "Created {} record {} in domain {domain_id}",
            record.record_type,
            record.id
        );
        Ok(state)
    }

    fn read(&self, ctx: &mut ApplyContext, prior: &State) -> Result<ReadOutcome> {
        let domain_id = prior.require_int("domain_id")?;
        let id = prior.numeric_id()?;
        let record = found(
            self.provider
                .client
                .get_domain_record(&ctx.cancel, domain_id, id),
        )
        .with_context(|| format!("failed to read record {id} in domain {domain_id}"))?;
        match record {
            Some(r) => {
                let state = self.keep_known(ctx, prior, Self::flatten(domain_id, &r))?;
                Ok(ReadOutcome::Found(state))
            }
            None => Ok(ReadOutcome::Gone),
        }
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
        let domain_id = prior.require_int("domain_id")?;
        let id = prior.numeric_id()?;
        let opts = Self::update_options(planned, changes);
        let record = self
            .provider
            .client
            .update_domain_record(&ctx.cancel, domain_id, id, &opts)
            .with_context(|| format!("failed to update record {id} in domain {domain_id}"))?;
        self.keep_known(ctx, planned, Self::flatten(domain_id, &record))
    }

    fn delete(&self, ctx: &mut ApplyContext, prior: &State) -> Result<()> {
        let domain_id = prior.require_int("domain_id")?;
        let id = prior.numeric_id()?;
        deleted(
            self.provider
                .client
                .delete_domain_record(&ctx.cancel, domain_id, id),
            &format!("record {id} in domain {domain_id}"),
        )
        .with_context(|| format!("failed to delete record {id} in domain {domain_id}"))
    }

    /// Import ID: `<domain_id>,<id>`
    fn import(&self, ctx: &mut ApplyContext, id: &str) -> Result<ReadOutcome> {
        let parts = parse_import_id(id, &["domain_id", "id"])?;
        let domain_id = parse_id(&parts[0], "domain ID")?;
        let record_id = parse_id(&parts[1], "record ID")?;
        let seed = State::new()
            .with("domain_id", domain_id)
            .with("id", record_id.to_string());
        self.read(ctx, &seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{ctx, provider};
    use linode_api::types::DomainCreateOptions;
    use linode_api::{CancelToken, CloudClient, MockClient};
    use reconcile::diff::{self, Action};

    fn setup() -> (MockClient, DomainRecordResource) {
        let mock = MockClient::new();
        mock.create_domain(
            &CancelToken::new(),
            &DomainCreateOptions {
                domain: "example.com".to_string(),
                domain_type: "master".to_string(),
                soa_email: Some("admin@example.com".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        let r = DomainRecordResource::new(provider(&mock));
        (mock, r)
    }

    fn cname(name: &str, target: &str) -> State {
        State::new()
            .with("domain_id", 1)
            .with("name", name)
            .with("record_type", "CNAME")
            .with("target", target)
    }

    fn create(r: &DomainRecordResource, config: &State) -> State {
        let plan = diff::plan(r.model(), None, Some(config));
        r.create(&mut ctx(), plan.planned.as_ref().unwrap()).unwrap()
    }

    fn plan(r: &DomainRecordResource, prior: &State, config: &State) -> Plan {
        let mut plan = diff::plan(r.model(), Some(prior), Some(config));
        r.modify_plan(&mut ctx(), Some(prior), &mut plan).unwrap();
        plan
    }

    #[test]
    fn test_names_equivalent() {
        assert!(names_equivalent("www", "www", "example.com"));
        assert!(names_equivalent("www.example.com", "www", "example.com"));
        assert!(names_equivalent("example.com", "", "example.com"));
        assert!(!names_equivalent("wwwexample.com", "www", "example.com"));
        assert!(!names_equivalent("mail.example.com", "www", "example.com"));
    }

    #[test]
    fn test_short_target_is_stable() {
        let (mock, r) = setup();
        let state = create(&r, &cname("www", "web"));
        assert_eq!(state.str("target"), Some("web"));
        assert_eq!(
            mock.calls().last().map(String::as_str),
            Some("POST /domains/1/records")
        );

        let read = r.read(&mut ctx(), &state).unwrap().into_state().unwrap();
        assert_eq!(read, state);

        mock.clear_calls();
        let plan = plan(&r, &read, &cname("www", "web"));
        assert_eq!(plan.changes.action, Action::NoOp);
        assert!(mock.mutating_calls().is_empty());
    }

    #[test]
    fn test_applied_state_keeps_planned_spelling() {
        let (mock, r) = setup();
        let config = cname("www.example.com", "web");
        let planned = diff::plan(r.model(), None, Some(&config)).planned.unwrap();
        let state = r.create(&mut ctx(), &planned).unwrap();
        assert_eq!(state.str("name"), Some("www.example.com"));
        assert_eq!(state.str("target"), Some("web"));
        assert!(mock.calls().contains(&"GET /domains/1".to_string()));

        let read = r.read(&mut ctx(), &state).unwrap().into_state().unwrap();
        assert_eq!(read, state);
        let noop = plan(&r, &read, &config);
        assert_eq!(noop.changes.action, Action::NoOp);
        assert_eq!(noop.planned.unwrap().str("name"), Some("www.example.com"));

        // A real rename still reads back as the API spells it.
        let rename = plan(&r, &state, &cname("blog", "cdn.example.net"));
        let renamed = r
            .update(&mut ctx(), &state, rename.planned.as_ref().unwrap(), &rename.changes)
            .unwrap();
        assert_eq!(renamed.str("name"), Some("blog"));
        assert_eq!(renamed.str("target"), Some("cdn.example.net"));
    }

    #[test]
    fn test_fully_qualified_name_is_suppressed() {
        let (mock, r) = setup();
        let state = create(&r, &cname("www", "web"));
        assert_eq!(state.str("name"), Some("www"));

        let plan = plan(&r, &state, &cname("www.example.com", "web"));
        assert_eq!(plan.changes.action, Action::NoOp);
        assert_eq!(plan.planned.unwrap().str("name"), Some("www"));
        assert!(mock.calls().contains(&"GET /domains/1".to_string()));
    }

    #[test]
    fn test_real_rename_updates() {
        let (mock, r) = setup();
        let state = create(&r, &cname("www", "web"));
        let plan = plan(&r, &state, &cname("blog", "web"));
        assert_eq!(plan.changes.action, Action::Update);

        mock.clear_calls();
        let after = r
            .update(&mut ctx(), &state, plan.planned.as_ref().unwrap(), &plan.changes)
            .unwrap();
        assert_eq!(after.str("name"), Some("blog"));
        assert_eq!(mock.mutating_calls(), vec!["PUT /domains/1/records/2"]);
    }

    #[test]
    fn test_record_type_forces_replace() {
        let (_mock, r) = setup();
        let state = create(&r, &cname("www", "web"));
        let config = cname("www", "192.0.2.10").with("record_type", "A");
        let plan = plan(&r, &state, &config);
        assert_eq!(plan.changes.action, Action::Replace);
        assert!(plan.planned.unwrap().get("id").is_unknown());
    }

    #[test]
    fn test_import() {
        let (_mock, r) = setup();
        let state = create(&r, &cname("www", "web"));
        let imported = r.import(&mut ctx(), "1,2").unwrap().into_state().unwrap();
        assert_eq!(imported.str("id"), state.str("id"));
        assert_eq!(imported.str("target"), Some("web.example.com"));
        assert_eq!(plan(&r, &imported, &cname("www", "web")).changes.action, Action::NoOp);
        assert!(r.import(&mut ctx(), "2").is_err());
        assert!(r.import(&mut ctx(), "1,99").unwrap().is_gone());
    }

    #[test]
    fn test_validate_srv() {
        let (_mock, r) = setup();
        let mut diags = Diagnostics::new();
        r.validate(&cname("_sip", "sip").with("record_type", "SRV"), &mut diags);
        assert_eq!(diags.len(), 2);
    }
}
