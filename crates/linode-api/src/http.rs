//! Blocking HTTP implementation of [`CloudClient`] on top of `ureq`.
//!
//! Requests carry a bearer token, an optional `X-Filter` header, and a
//! timeout clamped to the caller's [`CancelToken`] deadline. Transient
//! failures (transport errors, 429, 502-504) are retried with exponential
//! backoff. Non-success responses are decoded from the `{"errors": [...]}`
//! envelope into [`Error::Api`].

use crate::cancel::CancelToken;
use crate::client::CloudClient;
use crate::error::{ApiReason, Error, Result};
use crate::filter::Filter;
use crate::retry::{RetryConfig, with_retry};
use crate::types::{
    Domain, DomainCreateOptions, DomainRecord, DomainRecordCreateOptions,
    DomainRecordUpdateOptions, DomainUpdateOptions, Event, Firewall, FirewallCreateOptions,
    FirewallDevice, FirewallDeviceCreateOptions, FirewallRuleSet, FirewallUpdateOptions, Instance,
    InstanceIpAddOptions, IpAddress, IpAddressUpdateOptions, Page, ReserveIpOptions,
};
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Default API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.linode.com/v4";

/// Page size requested for list endpoints.
const PAGE_SIZE: u32 = 500;

/// Connection settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Personal access token.
    pub token: String,
    /// API base URL, without a trailing slash.
    pub api_url: String,
    /// Upper bound for a single request.
    pub request_timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryConfig,
    /// PEM bundle to trust instead of the platform roots.
    pub ca_cert: Option<PathBuf>,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
}

impl HttpConfig {
    /// Settings with defaults for everything but the token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(120),
            retry: RetryConfig::default(),
            ca_cert: None,
            user_agent: format!("linode-provider/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// Linode API client.
///
/// # Example
///
/// ```no_run
/// use linode_api::{CancelToken, CloudClient, HttpClient, HttpConfig};
///
/// let client = HttpClient::new(HttpConfig::new("my-token")).unwrap();
/// let domains = client.list_domains(&CancelToken::new(), None).unwrap();
/// println!("Found {} domains", domains.len());
/// ```
pub struct HttpClient {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// API base URL.
    api_base: String,
    token: String,
    user_agent: String,
    request_timeout: Duration,
    retry: RetryConfig,
}

impl HttpClient {
    /// Create a client from connection settings.
    pub fn new(config: HttpConfig) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(Error::Config("an API token is required".to_string()));
        }

        let mut builder = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.request_timeout));

        if let Some(path) = &config.ca_cert {
            let pem = fs::read(path).map_err(|e| Error::io(path, e))?;
            let cert = ureq::tls::Certificate::from_pem(&pem)
                .map_err(|e| {
                    Error::Config(format!("invalid CA certificate {}: {e}", path.display()))
                })?
                .to_owned();
            let tls = ureq::tls::TlsConfig::builder()
                .root_certs(ureq::tls::RootCerts::new_with_certs(&[cert]))
                .build();
            builder = builder.tls_config(tls);
        }

        let agent: ureq::Agent = builder.build().into();
        Ok(Self {
            agent,
            api_base: config.api_url.trim_end_matches('/').to_string(),
            token: config.token,
            user_agent: config.user_agent,
            request_timeout: config.request_timeout,
            retry: config.retry,
        })
    }

    /// Get the current API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn timeout_for(&self, cancel: &CancelToken) -> Duration {
        match cancel.remaining() {
            Some(remaining) => remaining.min(self.request_timeout),
            None => self.request_timeout,
        }
    }

    fn prepare<B>(
        &self,
        request: ureq::RequestBuilder<B>,
        cancel: &CancelToken,
        filter: Option<&Filter>,
    ) -> ureq::RequestBuilder<B> {
        let request = request
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/json")
            .header("User-Agent", self.user_agent.as_str())
            .config()
            .timeout_global(Some(self.timeout_for(cancel)))
            .build();
        match filter {
            Some(filter) if !filter.is_empty() => request.header("X-Filter", filter.to_header()),
            _ => request,
        }
    }

    /// Issue one request (with retries) and return the decoded body.
    fn send<T: DeserializeOwned>(
        &self,
        cancel: &CancelToken,
        method: Method,
        path: &str,
        filter: Option<&Filter>,
        body: Option<&Value>,
    ) -> Result<T> {
        let url = self.url(path);
        with_retry(&self.retry, cancel, || {
            cancel.check()?;
            log::debug!("{} {}", method.as_str(), url);

            let response = match method {
                Method::Get => self.prepare(self.agent.get(&url), cancel, filter).call(),
                Method::Delete => self.prepare(self.agent.delete(&url), cancel, filter).call(),
                Method::Post | Method::Put => {
                    let request = if method == Method::Post {
                        self.agent.post(&url)
                    } else {
                        self.agent.put(&url)
                    };
                    let request = self.prepare(request, cancel, filter);
                    match body {
                        Some(body) => request.send_json(body),
                        None => request.send_empty(),
                    }
                }
            };

            let mut response = response?;
            let status = response.status().as_u16();
            let text = response.body_mut().read_to_string()?;
            if status >= 400 {
                log::debug!("{} {} -> {}", method.as_str(), url, status);
                return Err(parse_error_body(status, &text));
            }
            decode_body(&text)
        })
    }

    fn get<T: DeserializeOwned>(&self, cancel: &CancelToken, path: &str) -> Result<T> {
        self.send(cancel, Method::Get, path, None, None)
    }

    fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        cancel: &CancelToken,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send(cancel, Method::Post, path, None, Some(&body))
    }

    fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        cancel: &CancelToken,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send(cancel, Method::Put, path, None, Some(&body))
    }

    fn delete(&self, cancel: &CancelToken, path: &str) -> Result<()> {
        let _: Value = self.send(cancel, Method::Delete, path, None, None)?;
        Ok(())
    }

    /// Walk every page of a list endpoint.
    fn list_all<T: DeserializeOwned>(
        &self,
        cancel: &CancelToken,
        path: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let paged = format!("{path}?page={page}&page_size={PAGE_SIZE}");
            let envelope: Page<T> = self.send(cancel, Method::Get, &paged, filter, None)?;
            let pages = envelope.pages;
            items.extend(envelope.data);
            if page >= pages {
                break;
            }
            page += 1;
        }
        Ok(items)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<ApiReason>,
}

/// Decode an error response body into an [`Error::Api`].
fn parse_error_body(status: u16, body: &str) -> Error {
    let reasons = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.errors)
        .unwrap_or_default();
    Error::api(status, reasons)
}

/// Decode a success body; an empty body decodes as JSON `null`.
fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    let text = if body.trim().is_empty() { "null" } else { body };
    Ok(serde_json::from_str(text)?)
}

impl CloudClient for HttpClient {
    fn list_domains(&self, cancel: &CancelToken, filter: Option<&Filter>) -> Result<Vec<Domain>> {
        self.list_all(cancel, "domains", filter)
    }

    fn get_domain(&self, cancel: &CancelToken, id: i64) -> Result<Domain> {
        self.get(cancel, &format!("domains/{id}"))
    }

    fn create_domain(&self, cancel: &CancelToken, opts: &DomainCreateOptions) -> Result<Domain> {
        self.post(cancel, "domains", opts)
    }

    fn update_domain(
        &self,
        cancel: &CancelToken,
        id: i64,
        opts: &DomainUpdateOptions,
    ) -> Result<Domain> {
        self.put(cancel, &format!("domains/{id}"), opts)
    }

    fn delete_domain(&self, cancel: &CancelToken, id: i64) -> Result<()> {
        self.delete(cancel, &format!("domains/{id}"))
    }

    fn list_domain_records(
        &self,
        cancel: &CancelToken,
        domain_id: i64,
        filter: Option<&Filter>,
    ) -> Result<Vec<DomainRecord>> {
        self.list_all(cancel, &format!("domains/{domain_id}/records"), filter)
    }

    fn get_domain_record(
        &self,
        cancel: &CancelToken,
        domain_id: i64,
        id: i64,
    ) -> Result<DomainRecord> {
        self.get(cancel, &format!("domains/{domain_id}/records/{id}"))
    }

    fn create_domain_record(
        &self,
        cancel: &CancelToken,
        domain_id: i64,
        opts: &DomainRecordCreateOptions,
    ) -> Result<DomainRecord> {
        self.post(cancel, &format!("domains/{domain_id}/records"), opts)
    }

    fn update_domain_record(
        &self,
        cancel: &CancelToken,
        domain_id: i64,
        id: i64,
        opts: &DomainRecordUpdateOptions,
    ) -> Result<DomainRecord> {
        self.put(cancel, &format!("domains/{domain_id}/records/{id}"), opts)
    }

    fn delete_domain_record(&self, cancel: &CancelToken, domain_id: i64, id: i64) -> Result<()> {
        self.delete(cancel, &format!("domains/{domain_id}/records/{id}"))
    }

    fn list_firewalls(
        &self,
        cancel: &CancelToken,
        filter: Option<&Filter>,
    ) -> Result<Vec<Firewall>> {
        self.list_all(cancel, "networking/firewalls", filter)
    }

    fn get_firewall(&self, cancel: &CancelToken, id: i64) -> Result<Firewall> {
        self.get(cancel, &format!("networking/firewalls/{id}"))
    }

    fn create_firewall(
        &self,
        cancel: &CancelToken,
        opts: &FirewallCreateOptions,
    ) -> Result<Firewall> {
        self.post(cancel, "networking/firewalls", opts)
    }

    fn update_firewall(
        &self,
        cancel: &CancelToken,
        id: i64,
        opts: &FirewallUpdateOptions,
    ) -> Result<Firewall> {
        self.put(cancel, &format!("networking/firewalls/{id}"), opts)
    }

    fn delete_firewall(&self, cancel: &CancelToken, id: i64) -> Result<()> {
        self.delete(cancel, &format!("networking/firewalls/{id}"))
    }

    fn get_firewall_rules(&self, cancel: &CancelToken, id: i64) -> Result<FirewallRuleSet> {
        self.get(cancel, &format!("networking/firewalls/{id}/rules"))
    }

    fn update_firewall_rules(
        &self,
        cancel: &CancelToken,
        id: i64,
        rules: &FirewallRuleSet,
    ) -> Result<FirewallRuleSet> {
        self.put(cancel, &format!("networking/firewalls/{id}/rules"), rules)
    }

    fn list_firewall_devices(
        &self,
        cancel: &CancelToken,
        firewall_id: i64,
    ) -> Result<Vec<FirewallDevice>> {
        self.list_all(
            cancel,
            &format!("networking/firewalls/{firewall_id}/devices"),
            None,
        )
    }

    fn get_firewall_device(
        &self,
        cancel: &CancelToken,
        firewall_id: i64,
        id: i64,
    ) -> Result<FirewallDevice> {
        self.get(
            cancel,
            &format!("networking/firewalls/{firewall_id}/devices/{id}"),
        )
    }

    fn create_firewall_device(
        &self,
        cancel: &CancelToken,
        firewall_id: i64,
        opts: &FirewallDeviceCreateOptions,
    ) -> Result<FirewallDevice> {
        self.post(
            cancel,
            &format!("networking/firewalls/{firewall_id}/devices"),
            opts,
        )
    }

    fn delete_firewall_device(
        &self,
        cancel: &CancelToken,
        firewall_id: i64,
        id: i64,
    ) -> Result<()> {
        self.delete(
            cancel,
            &format!("networking/firewalls/{firewall_id}/devices/{id}"),
        )
    }

    fn get_instance(&self, cancel: &CancelToken, id: i64) -> Result<Instance> {
        self.get(cancel, &format!("linode/instances/{id}"))
    }

    fn reboot_instance(&self, cancel: &CancelToken, id: i64) -> Result<()> {
        let _: Value = self.post(
            cancel,
            &format!("linode/instances/{id}/reboot"),
            &serde_json::json!({}),
        )?;
        Ok(())
    }

    fn get_instance_ip(
        &self,
        cancel: &CancelToken,
        linode_id: i64,
        address: &str,
    ) -> Result<IpAddress> {
        self.get(cancel, &format!("linode/instances/{linode_id}/ips/{address}"))
    }

    fn add_instance_ip(
        &self,
        cancel: &CancelToken,
        linode_id: i64,
        opts: &InstanceIpAddOptions,
    ) -> Result<IpAddress> {
        self.post(cancel, &format!("linode/instances/{linode_id}/ips"), opts)
    }

    fn update_instance_ip(
        &self,
        cancel: &CancelToken,
        linode_id: i64,
        address: &str,
        opts: &IpAddressUpdateOptions,
    ) -> Result<IpAddress> {
        self.put(
            cancel,
            &format!("linode/instances/{linode_id}/ips/{address}"),
            opts,
        )
    }

    fn delete_instance_ip(
        &self,
        cancel: &CancelToken,
        linode_id: i64,
        address: &str,
    ) -> Result<()> {
        self.delete(cancel, &format!("linode/instances/{linode_id}/ips/{address}"))
    }

    fn list_reserved_ips(
        &self,
        cancel: &CancelToken,
        filter: Option<&Filter>,
    ) -> Result<Vec<IpAddress>> {
        self.list_all(cancel, "networking/reserved/ips", filter)
    }

    fn reserve_ip(&self, cancel: &CancelToken, opts: &ReserveIpOptions) -> Result<IpAddress> {
        self.post(cancel, "networking/reserved/ips", opts)
    }

    fn get_reserved_ip(&self, cancel: &CancelToken, address: &str) -> Result<IpAddress> {
        self.get(cancel, &format!("networking/reserved/ips/{address}"))
    }

    fn delete_reserved_ip(&self, cancel: &CancelToken, address: &str) -> Result<()> {
        self.delete(cancel, &format!("networking/reserved/ips/{address}"))
    }

    fn list_events(&self, cancel: &CancelToken, filter: &Filter, page: u32) -> Result<Vec<Event>> {
        let envelope: Page<Event> = self.send(
            cancel,
            Method::Get,
            &format!("account/events?page={page}"),
            Some(filter),
            None,
        )?;
        Ok(envelope.data)
    }
}
