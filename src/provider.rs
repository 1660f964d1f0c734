//! Provider wiring: the shared client handle and the type registry.

use crate::config::ProviderConfig;
use crate::datasource::{DomainLookup, DomainsSource, FirewallsSource, ReservedIpsSource};
use crate::resource::{
    DomainRecordResource, DomainResource, FirewallDeviceResource, FirewallResource,
    InstanceIpResource, ReservedIpResource,
};
use anyhow::{Context, Result};
use linode_api::{CloudClient, HttpClient, HttpConfig};
use reconcile::{EventWaiter, HostAdapter};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// State shared by every reconciler and data source.
#[derive(Clone)]
pub struct Provider {
    pub client: Arc<dyn CloudClient>,
    pub waiter: EventWaiter,
    pub skip_implicit_reboots: bool,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("waiter", &self.waiter)
            .field("skip_implicit_reboots", &self.skip_implicit_reboots)
            .finish_non_exhaustive()
    }
}

impl Provider {
    pub fn new(
        client: Arc<dyn CloudClient>,
        poll_interval: Duration,
        skip_implicit_reboots: bool,
    ) -> Self {
        let waiter = EventWaiter::new(Arc::clone(&client), poll_interval);
        Self {
            client,
            waiter,
            skip_implicit_reboots,
        }
    }

    /// Connect to the API described by `config`.
    pub fn connect(config: &ProviderConfig) -> Result<Self> {
        let http = config.http_config()?;
        log::debug!("Connecting to {}", http.api_url);
        let client = HttpClient::new(http).context("Failed to configure the API client")?;
        Ok(Self::new(
            Arc::new(client),
            config.poll_interval(),
            config.skip_implicit_reboots,
        ))
    }

    /// A provider for commands that never reach the API, such as `schema`
    /// and `validate`. No token is needed.
    pub fn offline() -> Result<Self> {
        let client = HttpClient::new(HttpConfig::new("offline"))
            .context("Failed to configure the API client")?;
        Ok(Self::new(Arc::new(client), Duration::from_secs(1), false))
    }

    /// Every resource type and data source, ready for the host.
    pub fn adapter(&self) -> HostAdapter {
        let mut adapter = HostAdapter::new();
        adapter.register(Arc::new(DomainResource::new(self.clone())));
        adapter.register(Arc::new(DomainRecordResource::new(self.clone())));
        adapter.register(Arc::new(FirewallResource::new(self.clone())));
        adapter.register(Arc::new(FirewallDeviceResource::new(self.clone())));
        adapter.register(Arc::new(ReservedIpResource::new(self.clone())));
        adapter.register(Arc::new(InstanceIpResource::new(self.clone())));

        adapter.register_data_source(Arc::new(DomainsSource::new(self.clone())));
        adapter.register_data_source(Arc::new(DomainLookup::new(self.clone())));
        adapter.register_data_source(Arc::new(FirewallsSource::new(self.clone())));
        adapter.register_data_source(Arc::new(ReservedIpsSource::new(self.clone())));
        adapter
    }
}
