//! The [`CloudClient`] trait: typed access to the Linode API.
//!
//! Every method takes a [`CancelToken`] as its first argument. List methods
//! consume every page of the result stream, except
//! [`list_events`](CloudClient::list_events), which only ever needs the
//! newest page.

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::filter::Filter;
use crate::types::{
    Domain, DomainCreateOptions, DomainRecord, DomainRecordCreateOptions,
    DomainRecordUpdateOptions, DomainUpdateOptions, Event, Firewall, FirewallCreateOptions,
    FirewallDevice, FirewallDeviceCreateOptions, FirewallRuleSet, FirewallUpdateOptions, Instance,
    InstanceIpAddOptions, IpAddress, IpAddressUpdateOptions, ReserveIpOptions,
};

/// Typed Linode API surface used by the reconcilers.
///
/// Implementations must be safe to share across threads; one client is
/// shared by every reconciliation in the process.
pub trait CloudClient: Send + Sync {
    // Domains

    fn list_domains(&self, cancel: &CancelToken, filter: Option<&Filter>) -> Result<Vec<Domain>>;
    fn get_domain(&self, cancel: &CancelToken, id: i64) -> Result<Domain>;
    fn create_domain(&self, cancel: &CancelToken, opts: &DomainCreateOptions) -> Result<Domain>;
    fn update_domain(
        &self,
        cancel: &CancelToken,
        id: i64,
        opts: &DomainUpdateOptions,
    ) -> Result<Domain>;
    fn delete_domain(&self, cancel: &CancelToken, id: i64) -> Result<()>;

    // Domain records

    fn list_domain_records(
        &self,
        cancel: &CancelToken,
        domain_id: i64,
        filter: Option<&Filter>,
    ) -> Result<Vec<DomainRecord>>;
    fn get_domain_record(&self, cancel: &CancelToken, domain_id: i64, id: i64)
    -> Result<DomainRecord>;
    fn create_domain_record(
        &self,
        cancel: &CancelToken,
        domain_id: i64,
        opts: &DomainRecordCreateOptions,
    ) -> Result<DomainRecord>;
    fn update_domain_record(
        &self,
        cancel: &CancelToken,
        domain_id: i64,
        id: i64,
        opts: &DomainRecordUpdateOptions,
    ) -> Result<DomainRecord>;
    fn delete_domain_record(&self, cancel: &CancelToken, domain_id: i64, id: i64) -> Result<()>;

    // Firewalls

    fn list_firewalls(&self, cancel: &CancelToken, filter: Option<&Filter>)
    -> Result<Vec<Firewall>>;
    fn get_firewall(&self, cancel: &CancelToken, id: i64) -> Result<Firewall>;
    fn create_firewall(&self, cancel: &CancelToken, opts: &FirewallCreateOptions)
    -> Result<Firewall>;
    fn update_firewall(
        &self,
        cancel: &CancelToken,
        id: i64,
        opts: &FirewallUpdateOptions,
    ) -> Result<Firewall>;
    fn delete_firewall(&self, cancel: &CancelToken, id: i64) -> Result<()>;
    fn get_firewall_rules(&self, cancel: &CancelToken, id: i64) -> Result<FirewallRuleSet>;
    fn update_firewall_rules(
        &self,
        cancel: &CancelToken,
        id: i64,
        rules: &FirewallRuleSet,
    ) -> Result<FirewallRuleSet>;
    fn list_firewall_devices(&self, cancel: &CancelToken, firewall_id: i64)
    -> Result<Vec<FirewallDevice>>;
    fn get_firewall_device(
        &self,
        cancel: &CancelToken,
        firewall_id: i64,
        id: i64,
    ) -> Result<FirewallDevice>;
    fn create_firewall_device(
        &self,
        cancel: &CancelToken,
        firewall_id: i64,
        opts: &FirewallDeviceCreateOptions,
    ) -> Result<FirewallDevice>;
    fn delete_firewall_device(&self, cancel: &CancelToken, firewall_id: i64, id: i64)
    -> Result<()>;

    // Instances

    fn get_instance(&self, cancel: &CancelToken, id: i64) -> Result<Instance>;
    fn reboot_instance(&self, cancel: &CancelToken, id: i64) -> Result<()>;
    fn get_instance_ip(&self, cancel: &CancelToken, linode_id: i64, address: &str)
    -> Result<IpAddress>;
    fn add_instance_ip(
        &self,
        cancel: &CancelToken,
        linode_id: i64,
        opts: &InstanceIpAddOptions,
    ) -> Result<IpAddress>;
    fn update_instance_ip(
        &self,
        cancel: &CancelToken,
        linode_id: i64,
        address: &str,
        opts: &IpAddressUpdateOptions,
    ) -> Result<IpAddress>;
    fn delete_instance_ip(&self, cancel: &CancelToken, linode_id: i64, address: &str)
    -> Result<()>;

    // Reserved IPs

    fn list_reserved_ips(&self, cancel: &CancelToken, filter: Option<&Filter>)
    -> Result<Vec<IpAddress>>;
    fn reserve_ip(&self, cancel: &CancelToken, opts: &ReserveIpOptions) -> Result<IpAddress>;
    fn get_reserved_ip(&self, cancel: &CancelToken, address: &str) -> Result<IpAddress>;
    fn delete_reserved_ip(&self, cancel: &CancelToken, address: &str) -> Result<()>;

    // Events

    /// List one page of account events.
    fn list_events(&self, cancel: &CancelToken, filter: &Filter, page: u32) -> Result<Vec<Event>>;
}
