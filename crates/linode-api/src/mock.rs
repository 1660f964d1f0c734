//! In-memory [`CloudClient`] for testing without network access.
//!
//! `MockClient` keeps entities in memory, assigns IDs deterministically,
//! journals every call as `"METHOD /path"`, and can be told to fail specific
//! routes. It mimics the API behaviors the reconcilers depend on: record
//! targets expand to the zone, record names drop the zone suffix, deleting a
//! parent deletes its children, and reboots emit events.
//!
//! ```
//! use linode_api::{CancelToken, CloudClient, MockClient};
//! use linode_api::types::ReserveIpOptions;
//!
//! let mock = MockClient::new();
//! let ip = mock
//!     .reserve_ip(&CancelToken::new(), &ReserveIpOptions { region: "us-east".into() })
//!     .unwrap();
//! assert!(ip.reserved);
//! assert_eq!(mock.calls(), vec!["POST /networking/reserved/ips".to_string()]);
//! ```

use crate::cancel::CancelToken;
use crate::client::CloudClient;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::types::{
    Domain, DomainCreateOptions, DomainRecord, DomainRecordCreateOptions,
    DomainRecordUpdateOptions, DomainUpdateOptions, Event, EventEntity, Firewall,
    FirewallCreateOptions, FirewallDevice, FirewallDeviceCreateOptions, FirewallDeviceEntity,
    FirewallRuleSet, FirewallUpdateOptions, Instance, InstanceIpAddOptions, IpAddress,
    IpAddressUpdateOptions, ReserveIpOptions,
};
use chrono::{NaiveDateTime, Timelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Events returned per page by the fake event stream.
const EVENTS_PAGE_SIZE: usize = 25;

/// A journaled call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// HTTP method the real client would use.
    pub method: &'static str,
    /// Request path, without the API prefix.
    pub path: String,
}

impl Call {
    /// Whether the call changes cloud state.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        self.method != "GET"
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

#[derive(Debug, Default)]
struct MockState {
    next_id: i64,
    next_host: u32,
    domains: BTreeMap<i64, Domain>,
    records: BTreeMap<(i64, i64), DomainRecord>,
    firewalls: BTreeMap<i64, Firewall>,
    devices: BTreeMap<(i64, i64), FirewallDevice>,
    instances: BTreeMap<i64, Instance>,
    instance_ips: BTreeMap<String, IpAddress>,
    reserved: BTreeMap<String, IpAddress>,
    events: Vec<Event>,
    calls: Vec<Call>,
    failures: HashMap<String, VecDeque<u16>>,
    hold_events: bool,
}

impl MockState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn allocate_host(&mut self) -> u32 {
        self.next_host += 1;
        self.next_host
    }

    fn push_event(&mut self, action: &str, entity_type: &str, entity_id: i64, status: &str) {
        let id = self.allocate_id();
        self.events.push(Event {
            id,
            action: action.to_string(),
            created: now(),
            entity: Some(EventEntity {
                id: serde_json::json!(entity_id),
                entity_type: entity_type.to_string(),
                label: None,
                url: None,
            }),
            status: status.to_string(),
            seen: false,
            percent_complete: None,
            username: None,
        });
    }
}

fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

fn filtered<T: Serialize + Clone>(
    items: impl Iterator<Item = T>,
    filter: Option<&Filter>,
) -> Vec<T> {
    items
        .filter(|item| match filter {
            Some(filter) => serde_json::to_value(item).is_ok_and(|v| filter.matches(&v)),
            None => true,
        })
        .collect()
}

/// Mock client for testing without network access.
#[derive(Debug, Clone, Default)]
pub struct MockClient {
    state: Arc<Mutex<MockState>>,
}

impl MockClient {
    /// Create a new empty mock client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Journal a call and apply any injected failure for its route.
    fn enter(
        &self,
        cancel: &CancelToken,
        method: &'static str,
        path: String,
    ) -> Result<MutexGuard<'_, MockState>> {
        cancel.check()?;
        let mut state = self.state();
        let call = Call { method, path };
        let key = call.to_string();
        state.calls.push(call);
        if let Some(status) = state.failures.get_mut(&key).and_then(VecDeque::pop_front) {
            return Err(Error::api(status, Vec::new()));
        }
        Ok(state)
    }

    // ------------------------------------------------------------------
    // Test controls
    // ------------------------------------------------------------------

    /// Make the next call to `route` (e.g. `"DELETE /domains/1"`) fail with
    /// `status`. Repeated calls queue further failures.
    pub fn fail_next(&self, route: impl Into<String>, status: u16) {
        self.state()
            .failures
            .entry(route.into())
            .or_default()
            .push_back(status);
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.iter().map(ToString::to_string).collect()
    }

    /// Calls that would change cloud state.
    #[must_use]
    pub fn mutating_calls(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.is_mutating())
            .map(ToString::to_string)
            .collect()
    }

    /// Forget the call journal.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Register an instance with the given status.
    pub fn add_instance(&self, id: i64, status: &str) {
        self.state().instances.insert(
            id,
            Instance {
                id,
                label: format!("linode{id}"),
                region: "us-east".to_string(),
                status: status.to_string(),
            },
        );
    }

    /// Append an event to the stream.
    pub fn push_event(&self, event: Event) {
        self.state().events.push(event);
    }

    /// Stop reboots from emitting a finished event (they emit `started` only).
    pub fn hold_events(&self) {
        self.state().hold_events = true;
    }

    /// Remove a domain behind the provider's back.
    pub fn remove_domain(&self, id: i64) {
        let mut state = self.state();
        state.domains.remove(&id);
        state.records.retain(|(domain_id, _), _| *domain_id != id);
    }

    /// Remove a firewall behind the provider's back.
    pub fn remove_firewall(&self, id: i64) {
        let mut state = self.state();
        state.firewalls.remove(&id);
        state.devices.retain(|(fw, _), _| *fw != id);
    }

    /// Remove a reserved IP behind the provider's back.
    pub fn remove_reserved_ip(&self, address: &str) {
        self.state().reserved.remove(address);
    }

    /// Snapshot of a domain.
    #[must_use]
    pub fn domain(&self, id: i64) -> Option<Domain> {
        self.state().domains.get(&id).cloned()
    }

    /// Snapshot of all domains.
    #[must_use]
    pub fn domains(&self) -> Vec<Domain> {
        self.state().domains.values().cloned().collect()
    }

    /// Insert a domain directly, bypassing the journal.
    pub fn seed_domain(&self, domain: Domain) {
        let mut state = self.state();
        state.next_id = state.next_id.max(domain.id);
        state.domains.insert(domain.id, domain);
    }

    /// Insert a firewall directly, bypassing the journal.
    pub fn seed_firewall(&self, firewall: Firewall) {
        let mut state = self.state();
        state.next_id = state.next_id.max(firewall.id);
        state.firewalls.insert(firewall.id, firewall);
    }

    /// Snapshot of a firewall.
    #[must_use]
    pub fn firewall(&self, id: i64) -> Option<Firewall> {
        self.state().firewalls.get(&id).cloned()
    }

    /// Devices currently attached to a firewall.
    #[must_use]
    pub fn devices(&self, firewall_id: i64) -> Vec<FirewallDevice> {
        self.state()
            .devices
            .iter()
            .filter(|((fw, _), _)| *fw == firewall_id)
            .map(|(_, d)| d.clone())
            .collect()
    }

    /// Snapshot of all reserved IPs.
    #[must_use]
    pub fn reserved_ips(&self) -> Vec<IpAddress> {
        self.state().reserved.values().cloned().collect()
    }

    /// Addresses assigned to an instance.
    #[must_use]
    pub fn instance_ips(&self, linode_id: i64) -> Vec<IpAddress> {
        self.state()
            .instance_ips
            .values()
            .filter(|ip| ip.linode_id == Some(linode_id))
            .cloned()
            .collect()
    }
}

fn attach_device(
    state: &mut MockState,
    firewall_id: i64,
    entity_id: i64,
    entity_type: &str,
) -> FirewallDevice {
    let id = state.allocate_id();
    let url = match entity_type {
        "nodebalancer" => format!("/v4/nodebalancers/{entity_id}"),
        _ => format!("/v4/linode/instances/{entity_id}"),
    };
    let device = FirewallDevice {
        id,
        entity: FirewallDeviceEntity {
            id: entity_id,
            entity_type: entity_type.to_string(),
            label: format!("{entity_type}{entity_id}"),
            url,
        },
        created: Some(now()),
        updated: Some(now()),
    };
    state.devices.insert((firewall_id, id), device.clone());
    device
}

fn expand_target(record_type: &str, target: &str, zone: &str) -> String {
    let expands = matches!(record_type, "CNAME" | "MX" | "NS" | "SRV");
    if expands && !target.is_empty() && !target.contains('.') {
        format!("{target}.{zone}")
    } else {
        target.to_string()
    }
}

fn trim_zone(name: &str, zone: &str) -> String {
    if name == zone {
        return String::new();
    }
    name.strip_suffix(zone)
        .and_then(|n| n.strip_suffix('.'))
        .unwrap_or(name)
        .to_string()
}

impl CloudClient for MockClient {
    fn list_domains(&self, cancel: &CancelToken, filter: Option<&Filter>) -> Result<Vec<Domain>> {
        let state = self.enter(cancel, "GET", "/domains".to_string())?;
        Ok(filtered(state.domains.values().cloned(), filter))
    }

    fn get_domain(&self, cancel: &CancelToken, id: i64) -> Result<Domain> {
        let state = self.enter(cancel, "GET", format!("/domains/{id}"))?;
        state.domains.get(&id).cloned().ok_or_else(Error::not_found)
    }

    fn create_domain(&self, cancel: &CancelToken, opts: &DomainCreateOptions) -> Result<Domain> {
        let mut state = self.enter(cancel, "POST", "/domains".to_string())?;
        let id = state.allocate_id();
        let domain = Domain {
            id,
            domain: opts.domain.clone(),
            domain_type: opts.domain_type.clone(),
            group: opts.group.clone().unwrap_or_default(),
            status: opts.status.clone().unwrap_or_else(|| "active".to_string()),
            description: opts.description.clone().unwrap_or_default(),
            soa_email: opts.soa_email.clone().unwrap_or_default(),
            retry_sec: opts.retry_sec.unwrap_or_default(),
            master_ips: opts.master_ips.clone(),
            axfr_ips: opts.axfr_ips.clone(),
            tags: opts.tags.clone(),
            expire_sec: opts.expire_sec.unwrap_or_default(),
            refresh_sec: opts.refresh_sec.unwrap_or_default(),
            ttl_sec: opts.ttl_sec.unwrap_or_default(),
        };
        state.domains.insert(id, domain.clone());
        Ok(domain)
    }

    fn update_domain(
        &self,
        cancel: &CancelToken,
        id: i64,
        opts: &DomainUpdateOptions,
    ) -> Result<Domain> {
        let mut state = self.enter(cancel, "PUT", format!("/domains/{id}"))?;
        let domain = state.domains.get_mut(&id).ok_or_else(Error::not_found)?;
        let o = opts.clone();
        if let Some(v) = o.domain {
            domain.domain = v;
        }
        if let Some(v) = o.domain_type {
            domain.domain_type = v;
        }
        if let Some(v) = o.group {
            domain.group = v;
        }
        if let Some(v) = o.status {
            domain.status = v;
        }
        if let Some(v) = o.description {
            domain.description = v;
        }
        if let Some(v) = o.soa_email {
            domain.soa_email = v;
        }
        if let Some(v) = o.retry_sec {
            domain.retry_sec = v;
        }
        if let Some(v) = o.master_ips {
            domain.master_ips = v;
        }
        if let Some(v) = o.axfr_ips {
            domain.axfr_ips = v;
        }
        if let Some(v) = o.tags {
            domain.tags = v;
        }
        if let Some(v) = o.expire_sec {
            domain.expire_sec = v;
        }
        if let Some(v) = o.refresh_sec {
            domain.refresh_sec = v;
        }
        if let Some(v) = o.ttl_sec {
            domain.ttl_sec = v;
        }
        Ok(domain.clone())
    }

    fn delete_domain(&self, cancel: &CancelToken, id: i64) -> Result<()> {
        let mut state = self.enter(cancel, "DELETE", format!("/domains/{id}"))?;
        state.domains.remove(&id).ok_or_else(Error::not_found)?;
        state.records.retain(|(domain_id, _), _| *domain_id != id);
        Ok(())
    }

    fn list_domain_records(
        &self,
        cancel: &CancelToken,
        domain_id: i64,
        filter: Option<&Filter>,
    ) -> Result<Vec<DomainRecord>> {
        let state = self.enter(cancel, "GET", format!("/domains/{domain_id}/records"))?;
        if !state.domains.contains_key(&domain_id) {
            return Err(Error::not_found());
        }
        let records = state
            .records
            .iter()
            .filter(|((d, _), _)| *d == domain_id)
            .map(|(_, r)| r.clone());
        Ok(filtered(records, filter))
    }

    fn get_domain_record(
        &self,
        cancel: &CancelToken,
        domain_id: i64,
        id: i64,
    ) -> Result<DomainRecord> {
        let state = self.enter(cancel, "GET", format!("/domains/{domain_id}/records/{id}"))?;
        state
            .records
            .get(&(domain_id, id))
            .cloned()
            .ok_or_else(Error::not_found)
    }

    fn create_domain_record(
        &self,
        cancel: &CancelToken,
        domain_id: i64,
        opts: &DomainRecordCreateOptions,
    ) -> Result<DomainRecord> {
        let mut state = self.enter(cancel, "POST", format!("/domains/{domain_id}/records"))?;
        let zone = state
            .domains
            .get(&domain_id)
            .map(|d| d.domain.clone())
            .ok_or_else(Error::not_found)?;
        let id = state.allocate_id();
        let record = DomainRecord {
            id,
            record_type: opts.record_type.clone(),
            name: trim_zone(opts.name.as_deref().unwrap_or_default(), &zone),
            target: expand_target(&opts.record_type, &opts.target, &zone),
            priority: opts.priority.unwrap_or_default(),
            weight: opts.weight.unwrap_or_default(),
            port: opts.port.unwrap_or_default(),
            service: opts.service.clone(),
            protocol: opts.protocol.clone(),
            ttl_sec: opts.ttl_sec.unwrap_or_default(),
            tag: opts.tag.clone(),
        };
        state.records.insert((domain_id, id), record.clone());
        Ok(record)
    }

    fn update_domain_record(
        &self,
        cancel: &CancelToken,
        domain_id: i64,
        id: i64,
        opts: &DomainRecordUpdateOptions,
    ) -> Result<DomainRecord> {
        let mut state = self.enter(cancel, "PUT", format!("/domains/{domain_id}/records/{id}"))?;
        let zone = state
            .domains
            .get(&domain_id)
            .map(|d| d.domain.clone())
            .ok_or_else(Error::not_found)?;
        let record = state
            .records
            .get_mut(&(domain_id, id))
            .ok_or_else(Error::not_found)?;
        let o = opts.clone();
        if let Some(v) = o.name {
            record.name = trim_zone(&v, &zone);
        }
        if let Some(v) = o.target {
            record.target = expand_target(&record.record_type, &v, &zone);
        }
        if let Some(v) = o.priority {
            record.priority = v;
        }
        if let Some(v) = o.weight {
            record.weight = v;
        }
        if let Some(v) = o.port {
            record.port = v;
        }
        if o.service.is_some() {
            record.service = o.service;
        }
        if o.protocol.is_some() {
            record.protocol = o.protocol;
        }
        if let Some(v) = o.ttl_sec {
            record.ttl_sec = v;
        }
        if o.tag.is_some() {
            record.tag = o.tag;
        }
        Ok(record.clone())
    }

    fn delete_domain_record(&self, cancel: &CancelToken, domain_id: i64, id: i64) -> Result<()> {
        let mut state =
            self.enter(cancel, "DELETE", format!("/domains/{domain_id}/records/{id}"))?;
        state
            .records
            .remove(&(domain_id, id))
            .map(|_| ())
            .ok_or_else(Error::not_found)
    }

    fn list_firewalls(
        &self,
        cancel: &CancelToken,
        filter: Option<&Filter>,
    ) -> Result<Vec<Firewall>> {
        let state = self.enter(cancel, "GET", "/networking/firewalls".to_string())?;
        Ok(filtered(state.firewalls.values().cloned(), filter))
    }

    fn get_firewall(&self, cancel: &CancelToken, id: i64) -> Result<Firewall> {
        let state = self.enter(cancel, "GET", format!("/networking/firewalls/{id}"))?;
        state.firewalls.get(&id).cloned().ok_or_else(Error::not_found)
    }

    fn create_firewall(
        &self,
        cancel: &CancelToken,
        opts: &FirewallCreateOptions,
    ) -> Result<Firewall> {
        let mut state = self.enter(cancel, "POST", "/networking/firewalls".to_string())?;
        let id = state.allocate_id();
        let firewall = Firewall {
            id,
            label: opts.label.clone(),
            status: "enabled".to_string(),
            tags: opts.tags.clone(),
            rules: opts.rules.clone(),
            created: Some(now()),
            updated: Some(now()),
        };
        state.firewalls.insert(id, firewall.clone());
        for linode in &opts.devices.linodes {
            attach_device(&mut state, id, *linode, "linode");
        }
        for nodebalancer in &opts.devices.nodebalancers {
            attach_device(&mut state, id, *nodebalancer, "nodebalancer");
        }
        Ok(firewall)
    }

    fn update_firewall(
        &self,
        cancel: &CancelToken,
        id: i64,
        opts: &FirewallUpdateOptions,
    ) -> Result<Firewall> {
        let mut state = self.enter(cancel, "PUT", format!("/networking/firewalls/{id}"))?;
        let firewall = state.firewalls.get_mut(&id).ok_or_else(Error::not_found)?;
        if let Some(label) = &opts.label {
            firewall.label.clone_from(label);
        }
        if let Some(status) = &opts.status {
            firewall.status.clone_from(status);
        }
        if let Some(tags) = &opts.tags {
            firewall.tags.clone_from(tags);
        }
        firewall.updated = Some(now());
        Ok(firewall.clone())
    }

    fn delete_firewall(&self, cancel: &CancelToken, id: i64) -> Result<()> {
        let mut state = self.enter(cancel, "DELETE", format!("/networking/firewalls/{id}"))?;
        state.firewalls.remove(&id).ok_or_else(Error::not_found)?;
        state.devices.retain(|(fw, _), _| *fw != id);
        Ok(())
    }

    fn get_firewall_rules(&self, cancel: &CancelToken, id: i64) -> Result<FirewallRuleSet> {
        let state = self.enter(cancel, "GET", format!("/networking/firewalls/{id}/rules"))?;
        state
            .firewalls
            .get(&id)
            .map(|f| f.rules.clone())
            .ok_or_else(Error::not_found)
    }

    fn update_firewall_rules(
        &self,
        cancel: &CancelToken,
        id: i64,
        rules: &FirewallRuleSet,
    ) -> Result<FirewallRuleSet> {
        let mut state = self.enter(cancel, "PUT", format!("/networking/firewalls/{id}/rules"))?;
        let firewall = state.firewalls.get_mut(&id).ok_or_else(Error::not_found)?;
        firewall.rules = rules.clone();
        firewall.updated = Some(now());
        Ok(firewall.rules.clone())
    }

    fn list_firewall_devices(
        &self,
        cancel: &CancelToken,
        firewall_id: i64,
    ) -> Result<Vec<FirewallDevice>> {
        let state = self.enter(
            cancel,
            "GET",
            format!("/networking/firewalls/{firewall_id}/devices"),
        )?;
        if !state.firewalls.contains_key(&firewall_id) {
            return Err(Error::not_found());
        }
        Ok(state
            .devices
            .iter()
            .filter(|((fw, _), _)| *fw == firewall_id)
            .map(|(_, d)| d.clone())
            .collect())
    }

    fn get_firewall_device(
        &self,
        cancel: &CancelToken,
        firewall_id: i64,
        id: i64,
    ) -> Result<FirewallDevice> {
        let state = self.enter(
            cancel,
            "GET",
            format!("/networking/firewalls/{firewall_id}/devices/{id}"),
        )?;
        state
            .devices
            .get(&(firewall_id, id))
            .cloned()
            .ok_or_else(Error::not_found)
    }

    fn create_firewall_device(
        &self,
        cancel: &CancelToken,
        firewall_id: i64,
        opts: &FirewallDeviceCreateOptions,
    ) -> Result<FirewallDevice> {
        let mut state = self.enter(
            cancel,
            "POST",
            format!("/networking/firewalls/{firewall_id}/devices"),
        )?;
        if !state.firewalls.contains_key(&firewall_id) {
            return Err(Error::not_found());
        }
        let duplicate = state.devices.iter().any(|((fw, _), d)| {
            *fw == firewall_id && d.entity.id == opts.id && d.entity.entity_type == opts.entity_type
        });
        if duplicate {
            return Err(Error::api(400, Vec::new()));
        }
        Ok(attach_device(&mut state, firewall_id, opts.id, &opts.entity_type))
    }

    fn delete_firewall_device(
        &self,
        cancel: &CancelToken,
        firewall_id: i64,
        id: i64,
    ) -> Result<()> {
        let mut state = self.enter(
            cancel,
            "DELETE",
            format!("/networking/firewalls/{firewall_id}/devices/{id}"),
        )?;
        state
            .devices
            .remove(&(firewall_id, id))
            .map(|_| ())
            .ok_or_else(Error::not_found)
    }

    fn get_instance(&self, cancel: &CancelToken, id: i64) -> Result<Instance> {
        let state = self.enter(cancel, "GET", format!("/linode/instances/{id}"))?;
        state.instances.get(&id).cloned().ok_or_else(Error::not_found)
    }

    fn reboot_instance(&self, cancel: &CancelToken, id: i64) -> Result<()> {
        let mut state = self.enter(cancel, "POST", format!("/linode/instances/{id}/reboot"))?;
        if !state.instances.contains_key(&id) {
            return Err(Error::not_found());
        }
        let status = if state.hold_events { "started" } else { "finished" };
        state.push_event("linode_reboot", "linode", id, status);
        Ok(())
    }

    fn get_instance_ip(
        &self,
        cancel: &CancelToken,
        linode_id: i64,
        address: &str,
    ) -> Result<IpAddress> {
        let state = self.enter(
            cancel,
            "GET",
            format!("/linode/instances/{linode_id}/ips/{address}"),
        )?;
        state
            .instance_ips
            .get(address)
            .filter(|ip| ip.linode_id == Some(linode_id))
            .cloned()
            .ok_or_else(Error::not_found)
    }

    fn add_instance_ip(
        &self,
        cancel: &CancelToken,
        linode_id: i64,
        opts: &InstanceIpAddOptions,
    ) -> Result<IpAddress> {
        let mut state = self.enter(cancel, "POST", format!("/linode/instances/{linode_id}/ips"))?;
        let region = state
            .instances
            .get(&linode_id)
            .map(|i| i.region.clone())
            .ok_or_else(Error::not_found)?;

        let ip = match &opts.address {
            Some(address) => {
                let reserved = state.reserved.get_mut(address).ok_or_else(Error::not_found)?;
                if reserved.linode_id.is_some() {
                    return Err(Error::api(400, Vec::new()));
                }
                reserved.linode_id = Some(linode_id);
                reserved.clone()
            }
            None => {
                let host = state.allocate_host();
                IpAddress {
                    address: format!("192.0.2.{host}"),
                    gateway: Some("192.0.2.1".to_string()),
                    subnet_mask: "255.255.255.0".to_string(),
                    prefix: 24,
                    ip_type: opts.ip_type.clone(),
                    public: opts.public,
                    rdns: Some(format!("192-0-2-{host}.ip.linodeusercontent.com")),
                    linode_id: Some(linode_id),
                    region,
                    reserved: false,
                }
            }
        };
        state.instance_ips.insert(ip.address.clone(), ip.clone());
        Ok(ip)
    }

    fn update_instance_ip(
        &self,
        cancel: &CancelToken,
        linode_id: i64,
        address: &str,
        opts: &IpAddressUpdateOptions,
    ) -> Result<IpAddress> {
        let mut state = self.enter(
            cancel,
            "PUT",
            format!("/linode/instances/{linode_id}/ips/{address}"),
        )?;
        let ip = state
            .instance_ips
            .get_mut(address)
            .filter(|ip| ip.linode_id == Some(linode_id))
            .ok_or_else(Error::not_found)?;
        ip.rdns.clone_from(&opts.rdns);
        Ok(ip.clone())
    }

    fn delete_instance_ip(
        &self,
        cancel: &CancelToken,
        linode_id: i64,
        address: &str,
    ) -> Result<()> {
        let mut state = self.enter(
            cancel,
            "DELETE",
            format!("/linode/instances/{linode_id}/ips/{address}"),
        )?;
        match state.instance_ips.get(address) {
            Some(ip) if ip.linode_id == Some(linode_id) => {}
            _ => return Err(Error::not_found()),
        }
        state.instance_ips.remove(address);
        if let Some(reserved) = state.reserved.get_mut(address) {
            reserved.linode_id = None;
        }
        Ok(())
    }

    fn list_reserved_ips(
        &self,
        cancel: &CancelToken,
        filter: Option<&Filter>,
    ) -> Result<Vec<IpAddress>> {
        let state = self.enter(cancel, "GET", "/networking/reserved/ips".to_string())?;
        Ok(filtered(state.reserved.values().cloned(), filter))
    }

    fn reserve_ip(&self, cancel: &CancelToken, opts: &ReserveIpOptions) -> Result<IpAddress> {
        let mut state = self.enter(cancel, "POST", "/networking/reserved/ips".to_string())?;
        let host = state.allocate_host();
        let ip = IpAddress {
            address: format!("198.51.100.{host}"),
            gateway: Some("198.51.100.1".to_string()),
            subnet_mask: "255.255.255.0".to_string(),
            prefix: 24,
            ip_type: "ipv4".to_string(),
            public: true,
            rdns: None,
            linode_id: None,
            region: opts.region.clone(),
            reserved: true,
        };
        state.reserved.insert(ip.address.clone(), ip.clone());
        Ok(ip)
    }

    fn get_reserved_ip(&self, cancel: &CancelToken, address: &str) -> Result<IpAddress> {
        let state = self.enter(cancel, "GET", format!("/networking/reserved/ips/{address}"))?;
        state.reserved.get(address).cloned().ok_or_else(Error::not_found)
    }

    fn delete_reserved_ip(&self, cancel: &CancelToken, address: &str) -> Result<()> {
        let path = format!("/networking/reserved/ips/{address}");
        let mut state = self.enter(cancel, "DELETE", path)?;
        state
            .reserved
            .remove(address)
            .map(|_| ())
            .ok_or_else(Error::not_found)
    }

    fn list_events(&self, cancel: &CancelToken, filter: &Filter, page: u32) -> Result<Vec<Event>> {
        let state = self.enter(cancel, "GET", "/account/events".to_string())?;
        let mut events = filtered(state.events.iter().cloned(), Some(filter));
        events.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        let skip = (page.max(1) as usize - 1) * EVENTS_PAGE_SIZE;
        Ok(events.into_iter().skip(skip).take(EVENTS_PAGE_SIZE).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancel() -> CancelToken {
        CancelToken::new()
    }

    fn zone(mock: &MockClient) -> Domain {
        mock.create_domain(
            &cancel(),
            &DomainCreateOptions {
                domain: "example.com".to_string(),
                domain_type: "master".to_string(),
                soa_email: Some("admin@example.com".to_string()),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_domain_crud_and_journal() {
        let mock = MockClient::new();
        let domain = zone(&mock);
        assert_eq!(domain.status, "active");

        let updated = mock
            .update_domain(
                &cancel(),
                domain.id,
                &DomainUpdateOptions {
                    ttl_sec: Some(300),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.ttl_sec, 300);

        mock.delete_domain(&cancel(), domain.id).unwrap();
        assert!(mock.get_domain(&cancel(), domain.id).unwrap_err().is_not_found());

        assert_eq!(
            mock.calls(),
            vec![
                "POST /domains".to_string(),
                "PUT /domains/1".to_string(),
                "DELETE /domains/1".to_string(),
                "GET /domains/1".to_string(),
            ]
        );
        assert_eq!(mock.mutating_calls().len(), 3);
    }

    #[test]
    fn test_fail_next() {
        let mock = MockClient::new();
        mock.fail_next("POST /domains", 500);
        let err = mock
            .create_domain(&cancel(), &DomainCreateOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), Some(500));
        // Only the next call fails.
        assert!(
            mock.create_domain(&cancel(), &DomainCreateOptions::default())
                .is_ok()
        );
    }

    #[test]
    fn test_record_target_expansion_and_name_trim() {
        let mock = MockClient::new();
        let domain = zone(&mock);
        let record = mock
            .create_domain_record(
                &cancel(),
                domain.id,
                &DomainRecordCreateOptions {
                    record_type: "CNAME".to_string(),
                    name: Some("www.example.com".to_string()),
                    target: "web".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(record.name, "www");
        assert_eq!(record.target, "web.example.com");
    }

    #[test]
    fn test_list_domains_honors_filter() {
        let mock = MockClient::new();
        zone(&mock);
        let filter = Filter::new().eq("domain", "other.com");
        assert!(mock.list_domains(&cancel(), Some(&filter)).unwrap().is_empty());
        let filter = Filter::new().eq("domain", "example.com");
        assert_eq!(mock.list_domains(&cancel(), Some(&filter)).unwrap().len(), 1);
    }

    #[test]
    fn test_reboot_emits_event() {
        let mock = MockClient::new();
        mock.add_instance(7, "running");
        mock.reboot_instance(&cancel(), 7).unwrap();
        let events = mock
            .list_events(&cancel(), &Filter::new().eq("seen", false), 1)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "linode_reboot");
        assert_eq!(events[0].status, "finished");
    }

    #[test]
    fn test_reserved_ip_assignment() {
        let mock = MockClient::new();
        mock.add_instance(3, "offline");
        let reserved = mock
            .reserve_ip(
                &cancel(),
                &ReserveIpOptions {
                    region: "us-east".to_string(),
                },
            )
            .unwrap();
        let assigned = mock
            .add_instance_ip(
                &cancel(),
                3,
                &InstanceIpAddOptions {
                    ip_type: "ipv4".to_string(),
                    public: true,
                    address: Some(reserved.address.clone()),
                },
            )
            .unwrap();
        assert_eq!(assigned.address, reserved.address);
        assert!(assigned.reserved);

        mock.delete_instance_ip(&cancel(), 3, &reserved.address).unwrap();
        assert_eq!(mock.reserved_ips()[0].linode_id, None);
    }

    #[test]
    fn test_cancelled_call_is_rejected() {
        let mock = MockClient::new();
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(
            mock.get_domain(&token, 1),
            Err(Error::Cancelled)
        ));
        assert!(mock.calls().is_empty());
    }
}
