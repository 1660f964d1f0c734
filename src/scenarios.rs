//! End-to-end lifecycles driven through the host adapter, the way the host
//! sees the provider: JSON in, JSON and diagnostics out.

use crate::provider::testing::provider;
use linode_api::{CancelToken, MockClient};
use reconcile::{Action, HostAdapter, Response, Severity};
use serde_json::{Value as JsonValue, json};

struct Harness {
    mock: MockClient,
    adapter: HostAdapter,
    cancel: CancelToken,
}

impl Harness {
    fn new() -> Self {
        let mock = MockClient::new();
        for id in [10, 11, 12] {
            mock.add_instance(id, "running");
        }
        let adapter = provider(&mock).adapter();
        Self {
            mock,
            adapter,
            cancel: CancelToken::new(),
        }
    }

    fn plan(
        &self,
        type_name: &str,
        prior: Option<&JsonValue>,
        config: Option<&JsonValue>,
    ) -> Response {
        let response = self.adapter.plan(&self.cancel, type_name, prior, config);
        assert!(!response.has_errors(), "{:?}", response.diagnostics);
        response
    }

    /// Plan and apply, returning the applied state and every checkpoint.
    fn apply(
        &self,
        type_name: &str,
        prior: Option<&JsonValue>,
        config: Option<&JsonValue>,
    ) -> (Option<JsonValue>, Vec<JsonValue>) {
        let plan = self.plan(type_name, prior, config);
        let mut checkpoints = Vec::new();
        let response = self.adapter.apply(
            &self.cancel,
            type_name,
            prior,
            plan.state.as_ref(),
            &mut |s| checkpoints.push(s.clone()),
        );
        assert!(!response.has_errors(), "{:?}", response.diagnostics);
        (response.state, checkpoints)
    }

    fn create(&self, type_name: &str, config: &JsonValue) -> JsonValue {
        self.apply(type_name, None, Some(config)).0.unwrap()
    }

    fn action(&self, type_name: &str, prior: &JsonValue, config: &JsonValue) -> Action {
        self.plan(type_name, Some(prior), Some(config))
            .changes
            .unwrap()
            .action
    }
}

fn zone(name: &str) -> JsonValue {
    json!({
        "domain": name,
        "type": "master",
        "soa_email": "hostmaster@example.com",
        "ttl_sec": 299,
        "tags": ["Prod"],
    })
}

fn firewall(linodes: &[i64], inbound: JsonValue) -> JsonValue {
    json!({
        "label": "web-fw",
        "inbound": inbound,
        "inbound_policy": "DROP",
        "outbound_policy": "ACCEPT",
        "linodes": linodes,
    })
}

fn ssh_rule(ipv4: &str) -> JsonValue {
    json!({
        "label": "allow-ssh",
        "action": "ACCEPT",
        "protocol": "TCP",
        "ports": "22",
        "ipv4": [ipv4],
    })
}

#[test]
fn test_dns_zone_lifecycle() {
    let h = Harness::new();

    let plan = h.plan("linode_domain", None, Some(&zone("example.com")));
    assert_eq!(plan.changes.as_ref().unwrap().action, Action::Create);
    assert_eq!(plan.diagnostics.len(), 1);
    assert_eq!(plan.diagnostics[0].severity, Severity::Warning);
    assert_eq!(plan.diagnostics[0].attribute.as_deref(), Some("ttl_sec"));
    assert_eq!(plan.state.as_ref().unwrap()["ttl_sec"], json!(300));

    let (state, checkpoints) = h.apply("linode_domain", None, Some(&zone("example.com")));
    let state = state.unwrap();
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0]["id"], json!("1"));
    assert_eq!(state["id"], json!("1"));
    assert_eq!(state["ttl_sec"], json!(300));

    let read = h.adapter.read(&h.cancel, "linode_domain", &state);
    assert_eq!(read.state.as_ref(), Some(&state));

    // The configured 299 and the tag spelling never show up as drift.
    let respelled = json!({
        "domain": "example.com",
        "type": "master",
        "soa_email": "hostmaster@example.com",
        "ttl_sec": 299,
        "tags": ["prod"],
    });
    assert_eq!(h.action("linode_domain", &state, &respelled), Action::NoOp);

    let (gone, _) = h.apply("linode_domain", Some(&state), None);
    assert!(gone.is_none());
    assert!(h.mock.domains().is_empty());
}

#[test]
fn test_zone_rename_replaces() {
    let h = Harness::new();
    let state = h.create("linode_domain", &zone("example.com"));

    let plan = h.plan("linode_domain", Some(&state), Some(&zone("example.org")));
    assert_eq!(plan.changes.as_ref().unwrap().action, Action::Replace);

    h.mock.clear_calls();
    let (replaced, _) = h.apply("linode_domain", Some(&state), Some(&zone("example.org")));
    let replaced = replaced.unwrap();
    assert_eq!(h.mock.mutating_calls(), vec!["DELETE /domains/1", "POST /domains"]);
    assert_eq!(replaced["domain"], json!("example.org"));
    assert_ne!(replaced["id"], state["id"]);

    let secondary = json!({
        "domain": "example.org",
        "type": "slave",
        "master_ips": ["192.0.2.53"],
    });
    let plan = h.plan("linode_domain", Some(&replaced), Some(&secondary));
    let changes = plan.changes.unwrap();
    assert_eq!(changes.action, Action::Replace);
    assert_eq!(changes.replaced(), vec!["type"]);
    assert_eq!(plan.state.unwrap()["id"], json!(reconcile::UNKNOWN_MARKER));
}

#[test]
fn test_record_in_zone() {
    let h = Harness::new();
    let zone_state = h.create("linode_domain", &zone("example.com"));
    let record = json!({
        "domain_id": 1,
        "name": "www",
        "record_type": "CNAME",
        "target": "web.example.com",
    });
    let state = h.create("linode_domain_record", &record);
    assert_eq!(state["domain_id"], json!(1));
    assert_eq!(h.action("linode_domain_record", &state, &record), Action::NoOp);

    // Deleting the zone takes its records with it.
    h.apply("linode_domain", Some(&zone_state), None);
    let read = h.adapter.read(&h.cancel, "linode_domain_record", &state);
    assert!(read.gone);
}

#[test]
fn test_record_keeps_configured_spelling() {
    let h = Harness::new();
    h.create("linode_domain", &zone("example.com"));
    let record = json!({
        "domain_id": 1,
        "name": "www.example.com",
        "record_type": "CNAME",
        "target": "web",
    });
    let plan = h.plan("linode_domain_record", None, Some(&record));
    let planned = plan.state.unwrap();

    let state = h.create("linode_domain_record", &record);
    assert_eq!(state["name"], planned["name"]);
    assert_eq!(state["target"], planned["target"]);

    let read = h.adapter.read(&h.cancel, "linode_domain_record", &state);
    assert_eq!(read.state.as_ref(), Some(&state));
    assert_eq!(h.action("linode_domain_record", &state, &record), Action::NoOp);
}

#[test]
fn test_empty_values_round_trip() {
    let h = Harness::new();
    let config = json!({
        "domain": "example.com",
        "type": "master",
        "soa_email": "hostmaster@example.com",
        "tags": [],
        "description": "",
    });
    let state = h.create("linode_domain", &config);
    assert_eq!(state["tags"], json!([]));
    assert_eq!(state["description"], json!(""));

    let read = h.adapter.read(&h.cancel, "linode_domain", &state).state.unwrap();
    assert_eq!(read, state);
    assert_eq!(h.action("linode_domain", &read, &config), Action::NoOp);

    let config = firewall(&[], json!([]));
    let state = h.create("linode_firewall", &config);
    assert_eq!(state["linodes"], json!([]));
    assert_eq!(state["inbound"], json!([]));

    h.mock.clear_calls();
    let read = h.adapter.read(&h.cancel, "linode_firewall", &state).state.unwrap();
    assert_eq!(read, state);
    assert_eq!(h.action("linode_firewall", &read, &config), Action::NoOp);
    assert!(h.mock.mutating_calls().is_empty());
}

#[test]
fn test_firewall_rule_update_touches_only_rules() {
    let h = Harness::new();
    let config = firewall(&[10, 11], json!([ssh_rule("192.0.2.1/32")]));
    let state = h.create("linode_firewall", &config);
    assert_eq!(state["linodes"], json!([10, 11]));

    let same = firewall(&[10, 11], json!([ssh_rule("192.0.2.1")]));
    assert_eq!(h.action("linode_firewall", &state, &same), Action::NoOp);

    let https = json!({
        "label": "allow-https",
        "action": "ACCEPT",
        "protocol": "TCP",
        "ports": "443",
        "ipv4": ["0.0.0.0/0"],
    });
    let changed = firewall(&[10, 11], json!([ssh_rule("192.0.2.1/32"), https]));
    h.mock.clear_calls();
    let (after, _) = h.apply("linode_firewall", Some(&state), Some(&changed));
    assert_eq!(h.mock.mutating_calls(), vec!["PUT /networking/firewalls/1/rules"]);
    assert_eq!(after.unwrap()["inbound"].as_array().unwrap().len(), 2);
}

#[test]
fn test_firewall_devices_detach_before_attach() {
    let h = Harness::new();
    let rules = json!([ssh_rule("192.0.2.1/32")]);
    let state = h.create("linode_firewall", &firewall(&[10, 11], rules.clone()));
    let detached = h
        .mock
        .devices(1)
        .into_iter()
        .find(|d| d.entity.id == 10)
        .unwrap()
        .id;

    h.mock.clear_calls();
    let (after, _) = h.apply(
        "linode_firewall",
        Some(&state),
        Some(&firewall(&[11, 12], rules)),
    );
    assert_eq!(
        h.mock.mutating_calls(),
        vec![
            format!("DELETE /networking/firewalls/1/devices/{detached}"),
            "POST /networking/firewalls/1/devices".to_string(),
        ]
    );
    assert_eq!(after.unwrap()["linodes"], json!([11, 12]));
}

#[test]
fn test_external_delete_is_recovered() {
    let h = Harness::new();
    let config = firewall(&[10], json!([ssh_rule("192.0.2.1/32")]));
    let state = h.create("linode_firewall", &config);
    h.mock.remove_firewall(1);

    let read = h.adapter.read(&h.cancel, "linode_firewall", &state);
    assert!(read.gone);
    assert!(read.state.is_none());
    assert_eq!(read.diagnostics[0].severity, Severity::Warning);

    // With the state dropped, the next plan creates it again.
    let plan = h.plan("linode_firewall", None, Some(&config));
    assert_eq!(plan.changes.unwrap().action, Action::Create);
}

#[test]
fn test_reserved_ip_assignment() {
    let h = Harness::new();
    let reserved = h.create("linode_reserved_ip", &json!({"region": "us-east"}));
    let address = reserved["address"].as_str().unwrap().to_string();
    assert_eq!(reserved["id"], json!(address));
    assert_eq!(reserved["reserved"], json!(true));

    let assigned = h.create(
        "linode_instance_ip",
        &json!({"linode_id": 10, "address": address}),
    );
    assert_eq!(assigned["id"], json!(address));
    assert_eq!(assigned["linode_id"], json!(10));
    assert_eq!(assigned["apply_immediately"], json!(false));

    // Unassigning keeps the reservation.
    h.apply("linode_instance_ip", Some(&assigned), None);
    assert_eq!(h.mock.reserved_ips().len(), 1);

    h.mock.remove_reserved_ip(&address);
    let (gone, _) = h.apply("linode_reserved_ip", Some(&reserved), None);
    assert!(gone.is_none());
}

#[test]
fn test_import_then_query() {
    let h = Harness::new();
    h.create("linode_domain", &zone("example.com"));
    h.create(
        "linode_domain",
        &json!({
            "domain": "example.net",
            "type": "master",
            "soa_email": "a@example.net",
            "group": "edge",
        }),
    );

    let imported = h.adapter.import(&h.cancel, "linode_domain", "2");
    assert_eq!(imported.state.unwrap()["domain"], json!("example.net"));

    let missing = h.adapter.import(&h.cancel, "linode_domain", "99");
    assert!(missing.gone);

    let found = h.adapter.query(
        &h.cancel,
        "linode_domains",
        &json!({"filter": [{"name": "group", "values": ["edge"]}]}),
    );
    assert!(!found.has_errors(), "{:?}", found.diagnostics);
    let doc = found.state.unwrap();
    let domains = doc["domains"].as_array().unwrap();
    assert_eq!(domains.len(), 1);
    assert_eq!(domains[0]["domain"], json!("example.net"));
}

#[test]
fn test_unsupported_type() {
    let h = Harness::new();
    let response = h.adapter.plan(&h.cancel, "linode_instance", None, Some(&json!({})));
    assert!(response.has_errors());
}
