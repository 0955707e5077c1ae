//! Block storage volumes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::client::Client;
use crate::error::Result;
use crate::resource::{delete_ignoring_missing, gone_if_not_found, Lookup, Resource};
use crate::resources::{
    href_attribute, patch_changes, tags_attribute, tags_value, uuids, ObjectRef, Tags, ZoneRef,
};
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;

pub const IDENTIFIER: &str = "cloudscale_volume";
const COLLECTION: &str = "/volumes";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Volume {
    uuid: String,
    href: String,
    name: String,
    size_gb: i64,
    #[serde(rename = "type")]
    kind: String,
    zone: Option<ZoneRef>,
    #[serde(default)]
    servers: Vec<ObjectRef>,
    #[serde(default)]
    tags: Tags,
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    name: &'a str,
    size_gb: i64,
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    zone: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    server_uuids: Vec<String>,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    tags: Tags,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct VolumeResource;

fn path(id: &str) -> String {
    format!("{}/{}", COLLECTION, id)
}

#[async_trait]
impl Resource for VolumeResource {
    fn identifier(&self) -> &'static str {
        IDENTIFIER
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("size_gb", Attribute::required_int())
            .with_attribute(
                "type",
                Attribute::optional_string()
                    .default_value("ssd")
                    .force_new()
                    .describe("Either `ssd` or `bulk`."),
            )
            .with_attribute("zone_slug", Attribute::optional_string().computed().force_new())
            .with_attribute(
                "server_uuids",
                Attribute::optional_string_list()
                    .computed()
                    .describe("Servers the volume is attached to."),
            )
            .with_attribute("href", href_attribute())
            .with_attribute("tags", tags_attribute())
    }

    #[instrument(skip_all)]
    async fn create(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let req = CreateRequest {
            name: data.require_str("name")?,
            size_gb: data.require_i64("size_gb")?,
            kind: data.get_str("type").unwrap_or("ssd"),
            zone: data.get_str("zone_slug"),
            server_uuids: data.get_string_list("server_uuids"),
            tags: data.get_string_map("tags"),
        };
        info!("Creating volume {}", req.name);

        let volume: Volume = client.post(COLLECTION, &req).await?;
        info!("Created volume {}", volume.uuid);

        data.set_id(volume.uuid.as_str());
        Self::flatten(&volume, data);
        Ok(())
    }

    #[instrument(skip_all)]
    async fn read(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = client.get::<Volume>(&path(&id)).await;

        if let Some(volume) = gone_if_not_found(result, data)? {
            Self::flatten(&volume, data);
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn update(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let body = patch_changes(
            data,
            &[
                ("name", "name"),
                ("size_gb", "size_gb"),
                ("server_uuids", "server_uuids"),
                ("tags", "tags"),
            ],
        );

        if !body.is_empty() {
            info!("Updating volume {}", id);
            client.patch(&path(&id), &body).await?;
        }

        self.read(client, data).await
    }

    #[instrument(skip_all)]
    async fn delete(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        info!("Deleting volume {}", id);

        delete_ignoring_missing(client, &path(&id)).await?;
        data.clear_id();
        Ok(())
    }
}

impl Lookup for VolumeResource {
    type Item = Volume;

    const KIND: &'static str = "volume";
    const COLLECTION: &'static str = COLLECTION;
    const FILTERS: &'static [&'static str] = &["name", "zone_slug"];

    fn item_id(item: &Volume) -> String {
        item.uuid.clone()
    }

    fn flatten(item: &Volume, data: &mut ResourceData) {
        data.set("href", item.href.as_str());
        data.set("name", item.name.as_str());
        data.set("size_gb", item.size_gb);
        data.set("type", item.kind.as_str());
        data.set_opt("zone_slug", item.zone.as_ref().map(|z| z.slug.as_str()));
        data.set("server_uuids", uuids(&item.servers));
        data.set("tags", tags_value(&item.tags));
    }
}
