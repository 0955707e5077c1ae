//! Subnets of private networks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::client::Client;
use crate::error::Result;
use crate::resource::{delete_ignoring_missing, gone_if_not_found, Lookup, Resource};
use crate::resources::{
    href_attribute, patch_changes, string_list, tags_attribute, tags_value, ObjectRef, Tags,
};
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;

pub const IDENTIFIER: &str = "cloudscale_subnet";
const COLLECTION: &str = "/subnets";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Subnet {
    uuid: String,
    href: String,
    cidr: String,
    network: ObjectRef,
    gateway_address: Option<String>,
    #[serde(default)]
    dns_servers: Vec<String>,
    #[serde(default)]
    tags: Tags,
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    cidr: &'a str,
    network: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    gateway_address: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dns_servers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    tags: Tags,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SubnetResource;

fn path(id: &str) -> String {
    format!("{}/{}", COLLECTION, id)
}

#[async_trait]
impl Resource for SubnetResource {
    fn identifier(&self) -> &'static str {
        IDENTIFIER
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with_attribute("cidr", Attribute::required_string().force_new())
            .with_attribute("network_uuid", Attribute::required_string().force_new())
            .with_attribute("network_name", Attribute::computed_string())
            .with_attribute("network_href", Attribute::computed_string())
            .with_attribute("gateway_address", Attribute::optional_string().computed())
            .with_attribute(
                "dns_servers",
                Attribute::optional_string_list()
                    .computed()
                    .describe("Defaults to the cloudscale.ch resolvers when unset."),
            )
            .with_attribute("href", href_attribute())
            .with_attribute("tags", tags_attribute())
    }

    #[instrument(skip_all)]
    async fn create(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let req = CreateRequest {
            cidr: data.require_str("cidr")?,
            network: data.require_str("network_uuid")?,
            gateway_address: data.get_str("gateway_address"),
            dns_servers: data.get("dns_servers").map(|_| data.get_string_list("dns_servers")),
            tags: data.get_string_map("tags"),
        };
        info!("Creating subnet {} in network {}", req.cidr, req.network);

        let subnet: Subnet = client.post(COLLECTION, &req).await?;

        data.set_id(subnet.uuid.as_str());
        Self::flatten(&subnet, data);
        Ok(())
    }

    #[instrument(skip_all)]
    async fn read(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = client.get::<Subnet>(&path(&id)).await;

        if let Some(subnet) = gone_if_not_found(result, data)? {
            Self::flatten(&subnet, data);
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn update(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let body = patch_changes(
            data,
            &[
                ("gateway_address", "gateway_address"),
                ("dns_servers", "dns_servers"),
                ("tags", "tags"),
            ],
        );

        if !body.is_empty() {
            info!("Updating subnet {}", id);
            client.patch(&path(&id), &body).await?;
        }

        self.read(client, data).await
    }

    #[instrument(skip_all)]
    async fn delete(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        info!("Deleting subnet {}", id);

        delete_ignoring_missing(client, &path(&id)).await?;
        data.clear_id();
        Ok(())
    }
}

impl Lookup for SubnetResource {
    type Item = Subnet;

    const KIND: &'static str = "subnet";
    const COLLECTION: &'static str = COLLECTION;
    const FILTERS: &'static [&'static str] =
        &["cidr", "network_uuid", "network_name", "gateway_address"];

    fn item_id(item: &Subnet) -> String {
        item.uuid.clone()
    }

    fn flatten(item: &Subnet, data: &mut ResourceData) {
        data.set("href", item.href.as_str());
        data.set("cidr", item.cidr.as_str());
        data.set("network_uuid", item.network.uuid.as_str());
        data.set("network_name", item.network.name.as_str());
        data.set("network_href", item.network.href.as_str());
        data.set_opt("gateway_address", item.gateway_address.as_deref());
        data.set("dns_servers", string_list(&item.dns_servers));
        data.set("tags", tags_value(&item.tags));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::test_utils::{client, object};

    #[tokio::test]
    async fn test_create_with_custom_dns() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(url_path("/subnets"))
            .and(body_json(json!({
                "cidr": "10.11.12.0/24",
                "network": "net-1",
                "gateway_address": "10.11.12.1",
                "dns_servers": ["1.1.1.1"],
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "uuid": "sub-1",
                "href": "https://api.cloudscale.ch/v1/subnets/sub-1",
                "cidr": "10.11.12.0/24",
                "network": {"uuid": "net-1", "name": "backend", "href": ""},
                "gateway_address": "10.11.12.1",
                "dns_servers": ["1.1.1.1"],
                "tags": {},
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut data = ResourceData::new(object(json!({
            "cidr": "10.11.12.0/24",
            "network_uuid": "net-1",
            "gateway_address": "10.11.12.1",
            "dns_servers": ["1.1.1.1"],
        })));
        SubnetResource
            .create(&client(&mock_server.uri()), &mut data)
            .await
            .unwrap();

        assert_eq!(data.id(), Some("sub-1"));
        assert_eq!(data.get_str("network_name"), Some("backend"));
    }

    #[tokio::test]
    async fn test_update_resets_dns_servers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(url_path("/subnets/sub-1"))
            .and(body_json(json!({"dns_servers": null})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/subnets/sub-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uuid": "sub-1",
                "href": "https://api.cloudscale.ch/v1/subnets/sub-1",
                "cidr": "10.11.12.0/24",
                "network": {"uuid": "net-1", "name": "backend", "href": ""},
                "gateway_address": "10.11.12.1",
                "dns_servers": ["5.102.144.101", "5.102.144.102"],
                "tags": {},
            })))
            .mount(&mock_server)
            .await;

        let mut data = ResourceData::for_update(
            "sub-1",
            object(json!({"cidr": "10.11.12.0/24", "dns_servers": ["1.1.1.1"]})),
            object(json!({"cidr": "10.11.12.0/24", "dns_servers": null})),
        );
        SubnetResource
            .update(&client(&mock_server.uri()), &mut data)
            .await
            .unwrap();

        assert_eq!(data.get_string_list("dns_servers").len(), 2);
    }
}
