//! Request and response types for the Linode v4 API.
//!
//! Response types deserialize leniently (`#[serde(default)]` on fields the
//! API omits for some entity variants). Option structs serialize only the
//! fields that are set, since the API treats an omitted field as "leave
//! as-is" on update.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp format used by the Linode API.
pub const API_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Format an API timestamp the way the API renders it.
#[must_use]
pub fn format_time(time: &NaiveDateTime) -> String {
    time.format(API_TIME_FORMAT).to_string()
}

// =============================================================================
// Pagination
// =============================================================================

/// The paginated list envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// Current page number (1-indexed).
    pub page: u32,
    /// Total number of pages.
    pub pages: u32,
    /// Total number of results across all pages.
    pub results: u32,
}

// =============================================================================
// Domains
// =============================================================================

/// A DNS zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: i64,
    pub domain: String,
    #[serde(rename = "type")]
    pub domain_type: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub soa_email: String,
    #[serde(default)]
    pub retry_sec: i64,
    #[serde(default)]
    pub master_ips: Vec<String>,
    #[serde(default)]
    pub axfr_ips: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub expire_sec: i64,
    #[serde(default)]
    pub refresh_sec: i64,
    #[serde(default)]
    pub ttl_sec: i64,
}

/// Body of `POST /domains`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainCreateOptions {
    pub domain: String,
    #[serde(rename = "type")]
    pub domain_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soa_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_sec: Option<i64>,
    #[serde(default)]
    pub master_ips: Vec<String>,
    #[serde(default)]
    pub axfr_ips: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_sec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_sec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_sec: Option<i64>,
}

/// Body of `PUT /domains/{id}`. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainUpdateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub domain_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soa_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_sec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_ips: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axfr_ips: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_sec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_sec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_sec: Option<i64>,
}

impl DomainUpdateOptions {
    /// Whether no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A record inside a DNS zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub weight: i64,
    #[serde(default)]
    pub port: i64,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub ttl_sec: i64,
    #[serde(default)]
    pub tag: Option<String>,
}

/// Body of `POST /domains/{id}/records`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecordCreateOptions {
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_sec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Body of `PUT /domains/{id}/records/{record_id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecordUpdateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_sec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

// =============================================================================
// Firewalls
// =============================================================================

/// A Cloud Firewall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Firewall {
    pub id: i64,
    pub label: String,
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub rules: FirewallRuleSet,
    #[serde(default)]
    pub created: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated: Option<NaiveDateTime>,
}

/// Inbound and outbound rules plus default policies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRuleSet {
    #[serde(default)]
    pub inbound: Vec<FirewallRule>,
    #[serde(default)]
    pub inbound_policy: String,
    #[serde(default)]
    pub outbound: Vec<FirewallRule>,
    #[serde(default)]
    pub outbound_policy: String,
}

/// A single firewall rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub action: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,
    pub protocol: String,
    #[serde(default)]
    pub addresses: NetworkAddresses,
}

/// Address lists a rule applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAddresses {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<Vec<String>>,
}

/// Entities to attach when creating a firewall.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicesCreationOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linodes: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodebalancers: Vec<i64>,
}

/// Body of `POST /networking/firewalls`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallCreateOptions {
    pub label: String,
    pub rules: FirewallRuleSet,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub devices: DevicesCreationOptions,
}

/// Body of `PUT /networking/firewalls/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallUpdateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl FirewallUpdateOptions {
    /// Whether no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// An entity attached to a firewall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallDevice {
    pub id: i64,
    pub entity: FirewallDeviceEntity,
    #[serde(default)]
    pub created: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated: Option<NaiveDateTime>,
}

/// The entity behind a firewall device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallDeviceEntity {
    pub id: i64,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub url: String,
}

/// Body of `POST /networking/firewalls/{id}/devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallDeviceCreateOptions {
    pub id: i64,
    #[serde(rename = "type")]
    pub entity_type: String,
}

// =============================================================================
// Instances and IP addresses
// =============================================================================

/// The subset of a Linode instance the reconcilers need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: i64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub region: String,
    pub status: String,
}

impl Instance {
    /// Whether the instance is booted.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

/// An IPv4 address, either assigned to an instance or reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddress {
    pub address: String,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub subnet_mask: String,
    #[serde(default)]
    pub prefix: i64,
    #[serde(rename = "type", default)]
    pub ip_type: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub rdns: Option<String>,
    #[serde(default)]
    pub linode_id: Option<i64>,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub reserved: bool,
}

/// Body of `POST /linode/instances/{id}/ips`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceIpAddOptions {
    #[serde(rename = "type")]
    pub ip_type: String,
    pub public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Body of `PUT /linode/instances/{id}/ips/{address}`.
///
/// `rdns: None` resets the reverse DNS to the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddressUpdateOptions {
    pub rdns: Option<String>,
}

/// Body of `POST /networking/reserved/ips`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveIpOptions {
    pub region: String,
}

// =============================================================================
// Events
// =============================================================================

/// An entry in the account event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub action: String,
    pub created: NaiveDateTime,
    #[serde(default)]
    pub entity: Option<EventEntity>,
    pub status: String,
    #[serde(default)]
    pub seen: bool,
    #[serde(default)]
    pub percent_complete: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
}

/// The entity an event refers to.
///
/// `id` is kept as raw JSON because the API emits it as a number for most
/// entities and as a string for some.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntity {
    #[serde(default)]
    pub id: serde_json::Value,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_update_serializes_only_set_fields() {
        let opts = DomainUpdateOptions {
            ttl_sec: Some(300),
            ..Default::default()
        };
        let json = serde_json::to_value(&opts).unwrap();
        assert_eq!(json, serde_json::json!({"ttl_sec": 300}));
        assert!(!opts.is_empty());
        assert!(DomainUpdateOptions::default().is_empty());
    }

    #[test]
    fn test_event_deserializes_string_and_number_ids() {
        let numeric: Event = serde_json::from_value(serde_json::json!({
            "id": 1,
            "action": "linode_reboot",
            "created": "2024-03-01T10:00:00",
            "entity": {"id": 123, "type": "linode", "label": "web"},
            "status": "finished",
            "seen": false
        }))
        .unwrap();
        assert_eq!(numeric.entity.unwrap().id, serde_json::json!(123));

        let string: Event = serde_json::from_value(serde_json::json!({
            "id": 2,
            "action": "domain_create",
            "created": "2024-03-01T10:00:00",
            "entity": {"id": "456", "type": "domain"},
            "status": "started"
        }))
        .unwrap();
        assert_eq!(string.entity.unwrap().id, serde_json::json!("456"));
        assert!(!string.seen);
    }

    #[test]
    fn test_firewall_rule_roundtrip_shape() {
        let json = serde_json::json!({
            "action": "ACCEPT",
            "label": "ssh",
            "ports": "22",
            "protocol": "TCP",
            "addresses": {"ipv4": ["0.0.0.0/0"]}
        });
        let rule: FirewallRule = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(rule.addresses.ipv6, None);
        assert_eq!(serde_json::to_value(&rule).unwrap(), json);
    }

    #[test]
    fn test_format_time() {
        let time =
            NaiveDateTime::parse_from_str("2024-03-01T10:00:05", API_TIME_FORMAT).unwrap();
        assert_eq!(format_time(&time), "2024-03-01T10:00:05");
    }
}
