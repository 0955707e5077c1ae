//! Blocking wrapper around the async [Provider](crate::Provider).

use std::sync::LazyLock;

use anyhow::Result;
use serde_json::Value;
use tokio::runtime::{Builder, Runtime};
use tracing::info;

use crate::client::Client;
use crate::state::ResourceData;

static REGISTRY: LazyLock<crate::Provider> = LazyLock::new(crate::Provider::new);

/// Returns the names of all supported resources.
///
/// # Examples
///
/// ```
/// use cloudscale_provider::blocking::supported_resources;
///
/// let resources = supported_resources();
/// println!("Supported resources: {:?}", resources);
/// ```
pub fn supported_resources() -> Vec<String> {
    REGISTRY
        .resources()
        .into_iter()
        .map(String::from)
        .collect()
}

/// Returns the names of all supported data sources.
pub fn supported_data_sources() -> Vec<String> {
    REGISTRY
        .data_sources()
        .into_iter()
        .map(String::from)
        .collect()
}

/// A provider that drives every operation to completion on its own runtime.
///
/// # Examples
///
/// ```no_run
/// use cloudscale_provider::blocking::Provider;
/// use cloudscale_provider::ResourceData;
/// use serde_json::json;
///
/// let mut provider = Provider::new().unwrap();
/// provider.configure(&json!({"token": "secret"})).unwrap();
///
/// let network = provider.import("cloudscale_network", "2db69ba3").unwrap();
/// println!("Network: {:?}", network.get_str("name"));
/// ```
pub struct Provider {
    inner: crate::Provider,
    runtime: Runtime,
    client: Option<Client>,
}

impl Provider {
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;

        Ok(Self {
            inner: crate::Provider::new(),
            runtime,
            client: None,
        })
    }

    /// Validates the provider configuration and prepares the API client.
    pub fn configure(&mut self, config: &Value) -> Result<()> {
        let client = self.inner.configure(config)?;
        info!("Configured provider for {}", client.base_url());

        self.client = Some(client);
        Ok(())
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Provider is not configured"))
    }

    pub fn create(&self, resource_type: &str, data: &mut ResourceData) -> Result<()> {
        let client = self.client()?;
        self.runtime
            .block_on(self.inner.create(client, resource_type, data))?;
        Ok(())
    }

    pub fn read(&self, resource_type: &str, data: &mut ResourceData) -> Result<()> {
        let client = self.client()?;
        self.runtime
            .block_on(self.inner.read(client, resource_type, data))?;
        Ok(())
    }

    pub fn update(&self, resource_type: &str, data: &mut ResourceData) -> Result<()> {
        let client = self.client()?;
        self.runtime
            .block_on(self.inner.update(client, resource_type, data))?;
        Ok(())
    }

    pub fn delete(&self, resource_type: &str, data: &mut ResourceData) -> Result<()> {
        let client = self.client()?;
        self.runtime
            .block_on(self.inner.delete(client, resource_type, data))?;
        Ok(())
    }

    pub fn import(&self, resource_type: &str, id: &str) -> Result<ResourceData> {
        let client = self.client()?;
        Ok(self
            .runtime
            .block_on(self.inner.import(client, resource_type, id))?)
    }

    pub fn read_data_source(&self, data_source_type: &str, data: &mut ResourceData) -> Result<()> {
        let client = self.client()?;
        self.runtime
            .block_on(self.inner.read_data_source(client, data_source_type, data))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockito::Server;
    use serde_json::{json, Map};

    use super::*;

    fn configured(url: &str) -> Result<Provider> {
        crate::test_utils::init_tracing();
        let mut provider = Provider::new()?;
        provider.configure(&json!({"token": "blocking-token", "api_url": url}))?;
        Ok(provider)
    }

    #[test]
    fn test_supported_resources() {
        let resources = supported_resources();
        let data_sources = supported_data_sources();

        assert_eq!(resources.len(), 8);
        assert_eq!(data_sources.len(), 7);
        assert!(resources.contains(&"cloudscale_server".to_string()));
        assert!(!data_sources.contains(&"cloudscale_server".to_string()));
    }

    #[test]
    fn test_unconfigured_provider() -> Result<()> {
        let provider = Provider::new()?;
        let mut data = ResourceData::new(Map::new());

        let result = provider.read("cloudscale_network", &mut data);

        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_read_network() -> Result<()> {
        let mut server = Server::new();
        let url = server.url();

        let mock = server
            .mock("GET", "/networks/2db69ba3")
            .match_header("authorization", "Bearer blocking-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"uuid":"2db69ba3","href":"","name":"backend","mtu":9000,
                    "zone":{"slug":"rma1"},"subnets":[],"tags":{}}"#,
            )
            .create();

        let provider = configured(&url)?;
        let mut data = ResourceData::from_state("2db69ba3", Map::new());
        provider.read("cloudscale_network", &mut data)?;

        mock.assert();
        assert_eq!(data.get_str("name"), Some("backend"));
        assert_eq!(data.get_str("zone_slug"), Some("rma1"));

        Ok(())
    }

    #[test]
    fn test_delete_already_deleted_volume() -> Result<()> {
        let mut server = Server::new();
        let url = server.url();

        let mock = server
            .mock("DELETE", "/volumes/gone")
            .with_status(404)
            .with_body(r#"{"detail":"Not found."}"#)
            .create();

        let provider = configured(&url)?;
        let mut data = ResourceData::from_state("gone", Map::new());
        provider.delete("cloudscale_volume", &mut data)?;

        mock.assert();
        assert_eq!(data.id(), None);

        Ok(())
    }
}
