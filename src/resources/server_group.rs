//! Server groups (anti-affinity placement).

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

pub const IDENTIFIER: &str = "cloudscale_server_group";
const COLLECTION: &str = "/server-groups";
const DEFAULT_TYPE: &str = "anti-affinity";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ServerGroup {
    uuid: String,
    href: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    servers: Vec<ObjectRef>,
    zone: Option<ZoneRef>,
    #[serde(default)]
    tags: Tags,
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    zone: Option<&'a str>,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    tags: Tags,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ServerGroupResource;

fn path(id: &str) -> String {
    format!("{}/{}", COLLECTION, id)
}

#[async_trait]
impl Resource for ServerGroupResource {
    fn identifier(&self) -> &'static str {
        IDENTIFIER
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "type",
                Attribute::optional_string()
                    .default_value(DEFAULT_TYPE)
                    .force_new(),
            )
            .with_attribute("zone_slug", Attribute::optional_string().computed().force_new())
            .with_attribute(
                "server_uuids",
                Attribute::computed_string_list().describe("Members of the group."),
            )
            .with_attribute("href", href_attribute())
            .with_attribute("tags", tags_attribute())
    }

    #[instrument(skip_all)]
    async fn create(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let req = CreateRequest {
            name: data.require_str("name")?,
            kind: data.get_str("type").unwrap_or(DEFAULT_TYPE),
            zone: data.get_str("zone_slug"),
            tags: data.get_string_map("tags"),
        };
        info!("Creating server group {}", req.name);

        let group: ServerGroup = client.post(COLLECTION, &req).await?;

        data.set_id(group.uuid.as_str());
        Self::flatten(&group, data);
        Ok(())
    }

    #[instrument(skip_all)]
    async fn read(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = client.get::<ServerGroup>(&path(&id)).await;

        if let Some(group) = gone_if_not_found(result, data)? {
            Self::flatten(&group, data);
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn update(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let body = patch_changes(data, &[("name", "name"), ("tags", "tags")]);

        if !body.is_empty() {
            info!("Updating server group {}", id);
            client.patch(&path(&id), &body).await?;
        }

        self.read(client, data).await
    }

    #[instrument(skip_all)]
    async fn delete(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        info!("Deleting server group {}", id);

        delete_ignoring_missing(client, &path(&id)).await?;
        data.clear_id();
        Ok(())
    }
}

impl Lookup for ServerGroupResource {
    type Item = ServerGroup;

    const KIND: &'static str = "server group";
    const COLLECTION: &'static str = COLLECTION;
    const FILTERS: &'static [&'static str] = &["name", "zone_slug"];

    fn item_id(item: &ServerGroup) -> String {
        item.uuid.clone()
    }

    fn flatten(item: &ServerGroup, data: &mut ResourceData) {
        data.set("href", item.href.as_str());
        data.set("name", item.name.as_str());
        data.set("type", item.kind.as_str());
        data.set_opt("zone_slug", item.zone.as_ref().map(|z| z.slug.as_str()));
        data.set("server_uuids", uuids(&item.servers));
        data.set("tags", tags_value(&item.tags));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::resource::{DataSource, LookupDataSource};
    use crate::test_utils::{client, object};

    fn group_json(uuid: &str, name: &str, zone: &str) -> serde_json::Value {
        json!({
            "uuid": uuid,
            "href": format!("https://api.cloudscale.ch/v1/server-groups/{}", uuid),
            "name": name,
            "type": "anti-affinity",
            "servers": [],
            "zone": {"slug": zone},
            "tags": {},
        })
    }

    #[tokio::test]
    async fn test_create_defaults_to_anti_affinity() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(url_path("/server-groups"))
            .and(body_json(json!({"name": "web", "type": "anti-affinity"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(group_json("g1", "web", "rma1")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut data = ResourceData::new(object(json!({"name": "web"})));
        ServerGroupResource
            .create(&client(&mock_server.uri()), &mut data)
            .await
            .unwrap();

        assert_eq!(data.id(), Some("g1"));
        assert_eq!(data.get_str("zone_slug"), Some("rma1"));
    }

    #[tokio::test]
    async fn test_data_source_filters_by_name_and_zone() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/server-groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                group_json("g1", "web", "rma1"),
                group_json("g2", "web", "lpg1"),
                group_json("g3", "db", "lpg1"),
            ])))
            .mount(&mock_server)
            .await;

        let data_source = LookupDataSource::<ServerGroupResource>::new();
        let client = client(&mock_server.uri());

        let mut data = ResourceData::new(object(json!({"name": "web", "zone_slug": "lpg1"})));
        data_source.read(&client, &mut data).await.unwrap();
        assert_eq!(data.id(), Some("g2"));
        assert_eq!(data.get_str("id"), Some("g2"));

        let mut ambiguous = ResourceData::new(object(json!({"name": "web"})));
        let err = data_source.read(&client, &mut ambiguous).await.unwrap_err();
        assert!(matches!(err, crate::Error::AmbiguousMatch { count: 2, .. }));

        let mut missing = ResourceData::new(object(json!({"name": "cache"})));
        let err = data_source.read(&client, &mut missing).await.unwrap_err();
        assert!(matches!(err, crate::Error::NoMatch { .. }));
    }
}
