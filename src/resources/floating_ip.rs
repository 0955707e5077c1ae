//! Floating IPs.
//!
//! Floating IPs are addressed by their network address rather than a UUID:
//! `/floating-ips/192.0.2.123`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::resource::{delete_ignoring_missing, gone_if_not_found, Lookup, Resource};
use crate::resources::{
    href_attribute, patch_changes, tags_attribute, tags_value, ObjectRef, RegionRef, Tags,
};
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;

pub const IDENTIFIER: &str = "cloudscale_floating_ip";
const COLLECTION: &str = "/floating-ips";
const DEFAULT_TYPE: &str = "regional";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FloatingIp {
    href: String,
    network: String,
    ip_version: i64,
    next_hop: Option<String>,
    reverse_ptr: Option<String>,
    server: Option<ObjectRef>,
    region: Option<RegionRef>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    tags: Tags,
}

impl FloatingIp {
    /// The address part of `network`, e.g. `192.0.2.123` for `192.0.2.123/32`.
    fn address(&self) -> &str {
        self.network
            .split_once('/')
            .map_or(self.network.as_str(), |(address, _)| address)
    }

    fn prefix_length(&self) -> Option<i64> {
        self.network
            .split_once('/')
            .and_then(|(_, prefix)| prefix.parse().ok())
    }
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    ip_version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<&'a str>,
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reverse_ptr: Option<&'a str>,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    tags: Tags,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FloatingIpResource;

fn path(id: &str) -> String {
    format!("{}/{}", COLLECTION, id)
}

#[async_trait]
impl Resource for FloatingIpResource {
    fn identifier(&self) -> &'static str {
        IDENTIFIER
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with_attribute(
                "ip_version",
                Attribute::required_int().force_new().describe("Either 4 or 6."),
            )
            .with_attribute(
                "server",
                Attribute::optional_string().describe("UUID of the server the IP is assigned to."),
            )
            .with_attribute("region_slug", Attribute::optional_string().computed().force_new())
            .with_attribute(
                "type",
                Attribute::optional_string()
                    .default_value(DEFAULT_TYPE)
                    .force_new()
                    .describe("Either `regional` or `global`."),
            )
            .with_attribute("prefix_length", Attribute::optional_int().computed().force_new())
            .with_attribute("reverse_ptr", Attribute::optional_string().computed())
            .with_attribute("network", Attribute::computed_string())
            .with_attribute("next_hop", Attribute::computed_string())
            .with_attribute("href", href_attribute())
            .with_attribute("tags", tags_attribute())
    }

    #[instrument(skip_all)]
    async fn create(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let ip_version = data.require_i64("ip_version")?;
        if ip_version != 4 && ip_version != 6 {
            return Err(Error::InvalidAttribute {
                name: "ip_version".to_string(),
                reason: format!("must be 4 or 6, got {}", ip_version),
            });
        }

        let req = CreateRequest {
            ip_version,
            server: data.get_str("server"),
            region: data.get_str("region_slug"),
            kind: data.get_str("type").unwrap_or(DEFAULT_TYPE),
            prefix_length: data.get_i64("prefix_length"),
            reverse_ptr: data.get_str("reverse_ptr"),
            tags: data.get_string_map("tags"),
        };
        info!("Creating IPv{} floating IP", ip_version);

        let floating_ip: FloatingIp = client.post(COLLECTION, &req).await?;
        info!("Created floating IP {}", floating_ip.network);

        data.set_id(floating_ip.address());
        Self::flatten(&floating_ip, data);
        Ok(())
    }

    #[instrument(skip_all)]
    async fn read(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = client.get::<FloatingIp>(&path(&id)).await;

        if let Some(floating_ip) = gone_if_not_found(result, data)? {
            Self::flatten(&floating_ip, data);
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn update(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let body = patch_changes(
            data,
            &[
                ("server", "server"),
                ("reverse_ptr", "reverse_ptr"),
                ("tags", "tags"),
            ],
        );

        if !body.is_empty() {
            info!("Updating floating IP {}", id);
            client.patch(&path(&id), &body).await?;
        }

        self.read(client, data).await
    }

    #[instrument(skip_all)]
    async fn delete(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        info!("Deleting floating IP {}", id);

        delete_ignoring_missing(client, &path(&id)).await?;
        data.clear_id();
        Ok(())
    }
}

impl Lookup for FloatingIpResource {
    type Item = FloatingIp;

    const KIND: &'static str = "floating IP";
    const COLLECTION: &'static str = COLLECTION;
    const FILTERS: &'static [&'static str] = &[
        "network",
        "ip_version",
        "region_slug",
        "type",
        "reverse_ptr",
        "server",
    ];

    fn item_id(item: &FloatingIp) -> String {
        item.address().to_string()
    }

    fn flatten(item: &FloatingIp, data: &mut ResourceData) {
        data.set("href", item.href.as_str());
        data.set("network", item.network.as_str());
        data.set("ip_version", item.ip_version);
        data.set_opt("prefix_length", item.prefix_length());
        data.set_opt("next_hop", item.next_hop.as_deref());
        data.set_opt("reverse_ptr", item.reverse_ptr.as_deref());
        data.set_opt("server", item.server.as_ref().map(|s| s.uuid.as_str()));
        data.set_opt("region_slug", item.region.as_ref().map(|r| r.slug.as_str()));
        data.set("type", item.kind.as_str());
        data.set("tags", tags_value(&item.tags));
    }
}
