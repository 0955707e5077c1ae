//! Private networks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::client::Client;
use crate::error::Result;
use crate::resource::{delete_ignoring_missing, gone_if_not_found, Lookup, Resource};
use crate::resources::{href_attribute, patch_changes, tags_attribute, tags_value, Tags, ZoneRef};
use crate::schema::{Attribute, Schema, ValueType};
use crate::state::ResourceData;

pub const IDENTIFIER: &str = "cloudscale_network";
const COLLECTION: &str = "/networks";
const DEFAULT_MTU: i64 = 9000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Network {
    uuid: String,
    href: String,
    name: String,
    mtu: i64,
    zone: Option<ZoneRef>,
    #[serde(default)]
    subnets: Vec<SubnetRef>,
    #[serde(default)]
    tags: Tags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubnetRef {
    uuid: String,
    cidr: String,
    #[serde(default)]
    href: String,
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    zone: Option<&'a str>,
    mtu: i64,
    auto_create_ipv4_subnet: bool,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    tags: Tags,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkResource;

fn path(id: &str) -> String {
    format!("{}/{}", COLLECTION, id)
}

#[async_trait]
impl Resource for NetworkResource {
    fn identifier(&self) -> &'static str {
        IDENTIFIER
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("zone_slug", Attribute::optional_string().computed().force_new())
            .with_attribute(
                "mtu",
                Attribute::optional_int().computed().default_value(DEFAULT_MTU),
            )
            .with_attribute(
                "auto_create_ipv4_subnet",
                Attribute::optional_bool()
                    .default_value(true)
                    .force_new()
                    .describe("Create a default IPv4 subnet together with the network."),
            )
            .with_attribute(
                "subnets",
                Attribute::computed_only(ValueType::list(ValueType::Object(vec![
                    ("uuid", ValueType::String),
                    ("cidr", ValueType::String),
                    ("href", ValueType::String),
                ]))),
            )
            .with_attribute("href", href_attribute())
            .with_attribute("tags", tags_attribute())
    }

    #[instrument(skip_all)]
    async fn create(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let req = CreateRequest {
            name: data.require_str("name")?,
            zone: data.get_str("zone_slug"),
            mtu: data.get_i64("mtu").unwrap_or(DEFAULT_MTU),
            auto_create_ipv4_subnet: data.get_bool("auto_create_ipv4_subnet").unwrap_or(true),
            tags: data.get_string_map("tags"),
        };
        info!("Creating network {}", req.name);

        let network: Network = client.post(COLLECTION, &req).await?;

        data.set_id(network.uuid.as_str());
        Self::flatten(&network, data);
        Ok(())
    }

    #[instrument(skip_all)]
    async fn read(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = client.get::<Network>(&path(&id)).await;

        if let Some(network) = gone_if_not_found(result, data)? {
            Self::flatten(&network, data);
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn update(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let body = patch_changes(data, &[("name", "name"), ("mtu", "mtu"), ("tags", "tags")]);

        if !body.is_empty() {
            info!("Updating network {}", id);
            client.patch(&path(&id), &body).await?;
        }

        self.read(client, data).await
    }

    #[instrument(skip_all)]
    async fn delete(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        info!("Deleting network {}", id);

        delete_ignoring_missing(client, &path(&id)).await?;
        data.clear_id();
        Ok(())
    }
}

impl Lookup for NetworkResource {
    type Item = Network;

    const KIND: &'static str = "network";
    const COLLECTION: &'static str = COLLECTION;
    const FILTERS: &'static [&'static str] = &["name", "zone_slug", "mtu"];

    fn item_id(item: &Network) -> String {
        item.uuid.clone()
    }

    fn flatten(item: &Network, data: &mut ResourceData) {
        data.set("href", item.href.as_str());
        data.set("name", item.name.as_str());
        data.set("mtu", item.mtu);
        data.set_opt("zone_slug", item.zone.as_ref().map(|z| z.slug.as_str()));
        data.set(
            "subnets",
            item.subnets
                .iter()
                .map(|s| json!({"uuid": s.uuid, "cidr": s.cidr, "href": s.href}))
                .collect::<Vec<Value>>(),
        );
        data.set("tags", tags_value(&item.tags));
    }
}
