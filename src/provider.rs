//! The provider's registration table.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::client::Client;
use crate::config::Config;
use crate::consts::*;
use crate::error::{Error, Result};
use crate::resource::{DataSource, LookupDataSource, Resource};
use crate::resources::custom_image::CustomImageResource;
use crate::resources::floating_ip::FloatingIpResource;
use crate::resources::network::NetworkResource;
use crate::resources::objects_user::ObjectsUserResource;
use crate::resources::server::ServerResource;
use crate::resources::server_group::ServerGroupResource;
use crate::resources::subnet::SubnetResource;
use crate::resources::volume::VolumeResource;
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;

type R = Arc<dyn Resource>;
type D = Arc<dyn DataSource>;

/// The cloudscale.ch provider: resource and data source implementations by
/// name, plus the configuration needed to reach the API.
pub struct Provider {
    resources: BTreeMap<&'static str, R>,
    data_sources: BTreeMap<&'static str, D>,
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider {
    pub fn new() -> Self {
        let resources: Vec<R> = vec![
            Arc::new(ServerResource) as R,
            Arc::new(ServerGroupResource) as R,
            Arc::new(VolumeResource) as R,
            Arc::new(NetworkResource) as R,
            Arc::new(SubnetResource) as R,
            Arc::new(FloatingIpResource) as R,
            Arc::new(ObjectsUserResource) as R,
            Arc::new(CustomImageResource) as R,
        ];

        let data_sources: Vec<D> = vec![
            Arc::new(LookupDataSource::<ServerGroupResource>::new()) as D,
            Arc::new(LookupDataSource::<VolumeResource>::new()) as D,
            Arc::new(LookupDataSource::<NetworkResource>::new()) as D,
            Arc::new(LookupDataSource::<SubnetResource>::new()) as D,
            Arc::new(LookupDataSource::<FloatingIpResource>::new()) as D,
            Arc::new(LookupDataSource::<ObjectsUserResource>::new()) as D,
            Arc::new(LookupDataSource::<CustomImageResource>::new()) as D,
        ];

        Self {
            resources: resources.into_iter().map(|r| (r.identifier(), r)).collect(),
            data_sources: data_sources
                .into_iter()
                .map(|d| (d.identifier(), d))
                .collect(),
        }
    }

    /// Schema of the provider configuration block.
    pub fn schema(&self) -> Schema {
        Schema::new()
            .with_attribute(
                "token",
                Attribute::required_string()
                    .sensitive()
                    .env_default(TOKEN_ENV_VAR)
                    .describe("The token for API operations."),
            )
            .with_attribute(
                "api_url",
                Attribute::optional_string()
                    .env_default(API_URL_ENV_VAR)
                    .default_value(DEFAULT_API_URL)
                    .describe("Base URL of the cloudscale.ch API."),
            )
            .with_attribute(
                "timeout",
                Attribute::optional_int()
                    .default_value(DEFAULT_REQUEST_TIMEOUT)
                    .describe("Timeout of a single API request, in seconds."),
            )
    }

    /// Names of all registered resources, sorted.
    pub fn resources(&self) -> Vec<&'static str> {
        self.resources.keys().copied().collect()
    }

    /// Names of all registered data sources, sorted.
    pub fn data_sources(&self) -> Vec<&'static str> {
        self.data_sources.keys().copied().collect()
    }

    pub fn resource(&self, name: &str) -> Result<R> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownResource(name.to_string()))
    }

    pub fn data_source(&self, name: &str) -> Result<D> {
        self.data_sources
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDataSource(name.to_string()))
    }

    /// Validates the provider configuration, falling back to
    /// `CLOUDSCALE_TOKEN` and `CLOUDSCALE_API_URL`, and returns an API client.
    pub fn configure(&self, config: &Value) -> Result<Client> {
        self.configure_with_env(config, |var| std::env::var(var).ok())
    }

    #[instrument(skip_all)]
    pub(crate) fn configure_with_env<F>(&self, config: &Value, env: F) -> Result<Client>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values = match config {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(Error::InvalidAttribute {
                    name: "provider".to_string(),
                    reason: format!("expected an object, got {}", other),
                })
            }
        };

        let schema = self.schema();
        schema.apply_defaults_with(&mut values, env);
        schema.validate(&values)?;

        let token = values
            .get("token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::MissingAttribute("token".to_string()))?;

        let mut config = Config::new(token);
        if let Some(api_url) = values.get("api_url").and_then(Value::as_str) {
            config = config.with_api_url(api_url);
        }
        if let Some(timeout) = values.get("timeout").and_then(Value::as_i64) {
            let seconds = u64::try_from(timeout).map_err(|_| Error::InvalidAttribute {
                name: "timeout".to_string(),
                reason: "must not be negative".to_string(),
            })?;
            config = config.with_timeout(Duration::from_secs(seconds));
        }

        info!("Configuring API client for {}", config.api_url);
        config.client()
    }

    /// Validates `data` against the resource schema and creates the resource.
    pub async fn create(
        &self,
        client: &Client,
        resource_type: &str,
        data: &mut ResourceData,
    ) -> Result<()> {
        let resource = self.resource(resource_type)?;
        let schema = resource.schema();

        schema.apply_defaults(data.values_mut());
        schema.validate(data.values())?;

        debug!("Creating {}", resource_type);
        resource.create(client, data).await
    }

    pub async fn read(
        &self,
        client: &Client,
        resource_type: &str,
        data: &mut ResourceData,
    ) -> Result<()> {
        self.resource(resource_type)?.read(client, data).await
    }

    /// Applies in-place changes from the configured values in `data` to the
    /// prior state. Computed and defaulted attributes left unset keep their
    /// prior value. Changes to attributes that can only be set at creation
    /// are rejected.
    pub async fn update(
        &self,
        client: &Client,
        resource_type: &str,
        data: &mut ResourceData,
    ) -> Result<()> {
        let resource = self.resource(resource_type)?;
        let schema = resource.schema();

        schema.validate(data.values())?;
        for (name, attr) in schema.iter() {
            if (attr.computed || attr.default.is_some()) && data.keep_prior(name) {
                debug!("Keeping prior value of {}", name);
            }
        }
        schema.apply_defaults(data.values_mut());

        for (name, attr) in schema.iter() {
            if attr.force_new && data.has_change(name) {
                return Err(Error::RequiresReplacement(name.to_string()));
            }
        }

        debug!("Updating {} {:?}", resource_type, data.changed_keys());
        resource.update(client, data).await
    }

    pub async fn delete(
        &self,
        client: &Client,
        resource_type: &str,
        data: &mut ResourceData,
    ) -> Result<()> {
        self.resource(resource_type)?.delete(client, data).await
    }

    pub async fn import(
        &self,
        client: &Client,
        resource_type: &str,
        id: &str,
    ) -> Result<ResourceData> {
        self.resource(resource_type)?.import(client, id).await
    }

    pub async fn read_data_source(
        &self,
        client: &Client,
        data_source_type: &str,
        data: &mut ResourceData,
    ) -> Result<()> {
        let data_source = self.data_source(data_source_type)?;
        data_source.schema().validate(data.values())?;

        data_source.read(client, data).await
    }
}
