//! Virtual servers.
//!
//! Creating, scaling, starting and stopping a server are asynchronous on the
//! API side: the server reports `changing` until the operation completes, so
//! each of these steps is followed by a wait on the server status.

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strum::{Display, EnumString};
use tracing::{debug, info, instrument};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::resource::{delete_ignoring_missing, gone_if_not_found, Resource};
use crate::resources::{
    href_attribute, patch_changes, string_list, tags_attribute, tags_value, uuids, ObjectRef,
    Tags, ZoneRef,
};
use crate::schema::{Attribute, Schema, ValueType};
use crate::state::ResourceData;
use crate::waiter::{wait_for, WaitState};

pub const IDENTIFIER: &str = "cloudscale_server";
const COLLECTION: &str = "/servers";
const ROOT_DEVICE: &str = "/dev/vda";
const PUBLIC_NETWORK: &str = "public";

/// Lifecycle status reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ServerStatus {
    Changing,
    Running,
    Stopped,
    Errored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Server {
    uuid: String,
    href: String,
    name: String,
    status: String,
    flavor: Flavor,
    image: Option<Image>,
    zone: Option<ZoneRef>,
    #[serde(default)]
    volumes: Vec<Volume>,
    #[serde(default)]
    interfaces: Vec<Interface>,
    #[serde(default)]
    ssh_fingerprints: Vec<String>,
    #[serde(default)]
    ssh_host_keys: Vec<String>,
    #[serde(default)]
    server_groups: Vec<ObjectRef>,
    #[serde(default)]
    tags: Tags,
}

impl Server {
    fn status(&self) -> Result<ServerStatus> {
        ServerStatus::from_str(&self.status).map_err(|_| Error::InvalidAttribute {
            name: "status".to_string(),
            reason: format!("unexpected server status {}", self.status),
        })
    }

    fn root_volume(&self) -> Option<&Volume> {
        self.volumes
            .iter()
            .find(|v| v.device_path == ROOT_DEVICE)
            .or_else(|| self.volumes.first())
    }

    /// First address of the given IP version on an interface of `kind`.
    fn address(&self, kind: &str, version: i64) -> Option<&str> {
        self.interfaces
            .iter()
            .filter(|i| i.kind == kind)
            .flat_map(|i| i.addresses.iter())
            .find(|a| a.version == version)
            .map(|a| a.address.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Flavor {
    slug: String,
    #[serde(default)]
    vcpu_count: i64,
    #[serde(default)]
    memory_gb: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Image {
    slug: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Volume {
    uuid: String,
    #[serde(rename = "type")]
    kind: String,
    device_path: String,
    size_gb: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Interface {
    #[serde(rename = "type")]
    kind: String,
    network: Option<ObjectRef>,
    #[serde(default)]
    addresses: Vec<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Address {
    version: i64,
    address: String,
    prefix_length: Option<i64>,
    gateway: Option<String>,
    reverse_ptr: Option<String>,
    subnet: Option<SubnetRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubnetRef {
    uuid: String,
    cidr: String,
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    name: &'a str,
    flavor: &'a str,
    image: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    zone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume_size_gb: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bulk_volume_size_gb: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ssh_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_public_network: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_private_network: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_ipv6: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    server_groups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interfaces: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    tags: Tags,
}

/// Translates the `interfaces` attribute into the API's request format.
///
/// Public interfaces are requested as `{"network": "public"}`; private ones
/// reference their network and optionally pin addresses to subnets.
fn interfaces_request(data: &ResourceData) -> Option<Vec<Value>> {
    data.get("interfaces")?;

    let interfaces = data
        .get_list("interfaces")
        .iter()
        .map(|interface| {
            let kind = interface["type"].as_str().unwrap_or(PUBLIC_NETWORK);
            let mut request = Map::new();

            if kind == PUBLIC_NETWORK {
                request.insert("network".to_string(), json!(PUBLIC_NETWORK));
            } else if let Some(network) = interface["network_uuid"].as_str() {
                request.insert("network".to_string(), json!(network));
            }

            if let Some(addresses) = interface["addresses"].as_array() {
                let addresses: Vec<Value> = addresses
                    .iter()
                    .map(|address| {
                        let mut entry = Map::new();
                        if let Some(subnet) = address["subnet_uuid"].as_str() {
                            entry.insert("subnet".to_string(), json!(subnet));
                        }
                        if let Some(ip) = address["address"].as_str() {
                            entry.insert("address".to_string(), json!(ip));
                        }
                        Value::Object(entry)
                    })
                    .collect();
                request.insert("addresses".to_string(), Value::Array(addresses));
            }

            Value::Object(request)
        })
        .collect();

    Some(interfaces)
}

/// Whether the configured interfaces differ from the prior ones. Only the
/// fields a user can set are compared, so addresses assigned by the API do not
/// count as a change unless addresses were configured.
fn interfaces_changed(data: &ResourceData) -> bool {
    if data.get("interfaces").is_none() {
        return false;
    }

    let planned = data.get_list("interfaces");
    let prior = data.prior_list("interfaces");

    planned.len() != prior.len()
        || planned
            .iter()
            .zip(prior)
            .any(|(wanted, current)| !interface_matches(wanted, current))
}

fn interface_matches(wanted: &Value, current: &Value) -> bool {
    let kind = wanted["type"].as_str().unwrap_or(PUBLIC_NETWORK);
    if current["type"].as_str() != Some(kind) {
        return false;
    }

    if let Some(network) = wanted["network_uuid"].as_str() {
        if kind != PUBLIC_NETWORK && current["network_uuid"].as_str() != Some(network) {
            return false;
        }
    }

    let Some(addresses) = wanted["addresses"].as_array() else {
        return true;
    };
    let current_addresses = current["addresses"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default();

    addresses.len() == current_addresses.len()
        && addresses.iter().zip(current_addresses).all(|(a, b)| {
            ["subnet_uuid", "address"]
                .iter()
                .all(|field| a[*field].is_null() || a[*field] == b[*field])
        })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ServerResource;

fn path(id: &str) -> String {
    format!("{}/{}", COLLECTION, id)
}

impl ServerResource {
    async fn fetch(&self, client: &Client, id: &str) -> Result<Server> {
        client.get::<Server>(&path(id)).await
    }

    /// Waits until the server leaves `changing` and reports one of `targets`.
    #[instrument(skip(self, client))]
    async fn wait_for_status(
        &self,
        client: &Client,
        id: &str,
        targets: &[ServerStatus],
    ) -> Result<Server> {
        let what = format!("server {} to become {:?}", id, targets);

        wait_for(
            &what,
            client.wait_timeout(),
            client.poll_interval(),
            move || async move {
                let server = self.fetch(client, id).await?;
                let status = server.status()?;
                debug!("Server {} is {}", id, status);

                if targets.contains(&status) {
                    Ok(WaitState::Ready(server))
                } else if status == ServerStatus::Errored {
                    Err(Error::ServerErrored(id.to_string()))
                } else {
                    Ok(WaitState::Pending)
                }
            },
        )
        .await
    }

    async fn run_action(&self, client: &Client, id: &str, action: &str) -> Result<()> {
        info!("Server {}: {}", id, action);
        client
            .post_action(&format!("{}/{}", path(id), action))
            .await
    }

    async fn stop(&self, client: &Client, id: &str) -> Result<()> {
        self.run_action(client, id, "stop").await?;
        self.wait_for_status(client, id, &[ServerStatus::Stopped])
            .await
            .map(|_| ())
    }

    async fn start(&self, client: &Client, id: &str) -> Result<()> {
        self.run_action(client, id, "start").await?;
        self.wait_for_status(client, id, &[ServerStatus::Running])
            .await
            .map(|_| ())
    }

    /// Changes the flavor. The server is stopped for the change and started
    /// again afterwards if it was running.
    async fn change_flavor(
        &self,
        client: &Client,
        id: &str,
        flavor: &str,
        keep_stopped: bool,
    ) -> Result<()> {
        let server = self.fetch(client, id).await?;
        let was_running = server.status()? == ServerStatus::Running;

        if was_running {
            self.stop(client, id).await?;
        }

        info!("Scaling server {} to flavor {}", id, flavor);
        client.patch(&path(id), &json!({"flavor": flavor})).await?;
        self.wait_for_status(client, id, &[ServerStatus::Stopped, ServerStatus::Running])
            .await?;

        if was_running && !keep_stopped {
            self.start(client, id).await?;
        }
        Ok(())
    }

    fn flatten(server: &Server, data: &mut ResourceData) {
        data.set("href", server.href.as_str());
        data.set("name", server.name.as_str());
        data.set("status", server.status.as_str());
        data.set("flavor_slug", server.flavor.slug.as_str());
        data.set("vcpu_count", server.flavor.vcpu_count);
        data.set("memory_gb", server.flavor.memory_gb);
        if let Some(slug) = server.image.as_ref().and_then(|i| i.slug.as_deref()) {
            data.set("image_slug", slug);
        }
        data.set_opt("zone_slug", server.zone.as_ref().map(|z| z.slug.as_str()));
        data.set_opt("volume_size_gb", server.root_volume().map(|v| v.size_gb));
        data.set(
            "volumes",
            server
                .volumes
                .iter()
                .map(|v| {
                    json!({
                        "uuid": v.uuid,
                        "type": v.kind,
                        "device_path": v.device_path,
                        "size_gb": v.size_gb,
                    })
                })
                .collect::<Vec<Value>>(),
        );
        data.set(
            "interfaces",
            server
                .interfaces
                .iter()
                .map(|i| {
                    json!({
                        "type": i.kind,
                        "network_uuid": i.network.as_ref().map(|n| n.uuid.as_str()),
                        "network_name": i.network.as_ref().map(|n| n.name.as_str()),
                        "addresses": i.addresses.iter().map(|a| json!({
                            "version": a.version,
                            "address": a.address,
                            "prefix_length": a.prefix_length,
                            "gateway": a.gateway,
                            "reverse_ptr": a.reverse_ptr,
                            "subnet_uuid": a.subnet.as_ref().map(|s| s.uuid.as_str()),
                            "subnet_cidr": a.subnet.as_ref().map(|s| s.cidr.as_str()),
                        })).collect::<Vec<Value>>(),
                    })
                })
                .collect::<Vec<Value>>(),
        );
        data.set_opt("public_ipv4_address", server.address(PUBLIC_NETWORK, 4));
        data.set_opt("public_ipv6_address", server.address(PUBLIC_NETWORK, 6));
        data.set_opt("private_ipv4_address", server.address("private", 4));
        data.set("ssh_fingerprints", string_list(&server.ssh_fingerprints));
        data.set("ssh_host_keys", string_list(&server.ssh_host_keys));
        data.set("server_group_ids", uuids(&server.server_groups));
        data.set("tags", tags_value(&server.tags));
    }
}

fn address_type() -> ValueType {
    ValueType::Object(vec![
        ("version", ValueType::Int),
        ("address", ValueType::String),
        ("prefix_length", ValueType::Int),
        ("gateway", ValueType::String),
        ("reverse_ptr", ValueType::String),
        ("subnet_uuid", ValueType::String),
        ("subnet_cidr", ValueType::String),
    ])
}

fn interface_type() -> ValueType {
    ValueType::Object(vec![
        ("type", ValueType::String),
        ("network_uuid", ValueType::String),
        ("network_name", ValueType::String),
        ("addresses", ValueType::list(address_type())),
    ])
}

#[async_trait]
impl Resource for ServerResource {
    fn identifier(&self) -> &'static str {
        IDENTIFIER
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("flavor_slug", Attribute::required_string())
            .with_attribute("image_slug", Attribute::required_string().force_new())
            .with_attribute("zone_slug", Attribute::optional_string().computed().force_new())
            .with_attribute("volume_size_gb", Attribute::optional_int().computed())
            .with_attribute("bulk_volume_size_gb", Attribute::optional_int().force_new())
            .with_attribute("ssh_keys", Attribute::optional_string_list().force_new())
            .with_attribute(
                "password",
                Attribute::optional_string().sensitive().force_new(),
            )
            .with_attribute("use_public_network", Attribute::optional_bool().force_new())
            .with_attribute("use_private_network", Attribute::optional_bool().force_new())
            .with_attribute("use_ipv6", Attribute::optional_bool().force_new())
            .with_attribute(
                "server_group_ids",
                Attribute::optional_string_list().computed().force_new(),
            )
            .with_attribute("user_data", Attribute::optional_string().force_new())
            .with_attribute(
                "interfaces",
                Attribute::optional(ValueType::list(interface_type())).computed(),
            )
            .with_attribute(
                "status",
                Attribute::optional_string()
                    .computed()
                    .describe("Desired state, `running` or `stopped`."),
            )
            .with_attribute("vcpu_count", Attribute::computed_int())
            .with_attribute("memory_gb", Attribute::computed_int())
            .with_attribute(
                "volumes",
                Attribute::computed_only(ValueType::list(ValueType::Object(vec![
                    ("uuid", ValueType::String),
                    ("type", ValueType::String),
                    ("device_path", ValueType::String),
                    ("size_gb", ValueType::Int),
                ]))),
            )
            .with_attribute("public_ipv4_address", Attribute::computed_string())
            .with_attribute("public_ipv6_address", Attribute::computed_string())
            .with_attribute("private_ipv4_address", Attribute::computed_string())
            .with_attribute("ssh_fingerprints", Attribute::computed_string_list())
            .with_attribute("ssh_host_keys", Attribute::computed_string_list())
            .with_attribute("href", href_attribute())
            .with_attribute("tags", tags_attribute())
    }

    #[instrument(skip_all)]
    async fn create(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let desired = match data.get_str("status") {
            Some(status) => parse_desired_status(status)?,
            None => ServerStatus::Running,
        };

        let req = CreateRequest {
            name: data.require_str("name")?,
            flavor: data.require_str("flavor_slug")?,
            image: data.require_str("image_slug")?,
            zone: data.get_str("zone_slug"),
            volume_size_gb: data.get_i64("volume_size_gb"),
            bulk_volume_size_gb: data.get_i64("bulk_volume_size_gb"),
            ssh_keys: data.get_string_list("ssh_keys"),
            password: data.get_str("password"),
            use_public_network: data.get_bool("use_public_network"),
            use_private_network: data.get_bool("use_private_network"),
            use_ipv6: data.get_bool("use_ipv6"),
            server_groups: data.get_string_list("server_group_ids"),
            user_data: data.get_str("user_data"),
            interfaces: interfaces_request(data),
            tags: data.get_string_map("tags"),
        };
        info!("Creating server {} ({})", req.name, req.flavor);

        let server: Server = client.post(COLLECTION, &req).await?;
        let id = server.uuid.clone();
        data.set_id(id.as_str());
        info!("Created server {}, waiting for it to boot", id);

        let server = self
            .wait_for_status(client, &id, &[ServerStatus::Running, ServerStatus::Stopped])
            .await?;

        if desired == ServerStatus::Stopped && server.status()? != ServerStatus::Stopped {
            self.stop(client, &id).await?;
        }

        self.read(client, data).await
    }

    #[instrument(skip_all)]
    async fn read(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = self.fetch(client, &id).await;

        if let Some(server) = gone_if_not_found(result, data)? {
            Self::flatten(&server, data);
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn update(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let desired = if data.has_change("status") {
            data.get_str("status").map(parse_desired_status).transpose()?
        } else {
            None
        };
        let keep_stopped = desired == Some(ServerStatus::Stopped);

        if data.has_change("flavor_slug") {
            let flavor = data.require_str("flavor_slug")?.to_string();
            self.change_flavor(client, &id, &flavor, keep_stopped).await?;
        }

        let mut body = patch_changes(data, &[("name", "name"), ("tags", "tags")]);
        if interfaces_changed(data) {
            if let Some(interfaces) = interfaces_request(data) {
                body.insert("interfaces".to_string(), Value::Array(interfaces));
            }
        }
        if !body.is_empty() {
            info!("Updating server {}", id);
            client.patch(&path(&id), &body).await?;
        }

        if data.has_change("volume_size_gb") {
            let size_gb = data.require_i64("volume_size_gb")?;
            let server = self.fetch(client, &id).await?;
            let root = server.root_volume().ok_or_else(|| Error::InvalidAttribute {
                name: "volume_size_gb".to_string(),
                reason: format!("server {} has no root volume", id),
            })?;

            info!("Scaling root volume of server {} to {} GB", id, size_gb);
            client
                .patch(&format!("/volumes/{}", root.uuid), &json!({"size_gb": size_gb}))
                .await?;
        }

        if data.has_change("status") {
            let current = self.fetch(client, &id).await?.status()?;
            match desired {
                Some(ServerStatus::Running) if current != ServerStatus::Running => {
                    self.start(client, &id).await?
                }
                Some(ServerStatus::Stopped) if current != ServerStatus::Stopped => {
                    self.stop(client, &id).await?
                }
                _ => {}
            }
        }

        self.read(client, data).await
    }

    #[instrument(skip_all)]
    async fn delete(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        info!("Deleting server {}", id);

        delete_ignoring_missing(client, &path(&id)).await?;
        data.clear_id();
        Ok(())
    }
}

fn parse_desired_status(status: &str) -> Result<ServerStatus> {
    match ServerStatus::from_str(status) {
        Ok(status @ (ServerStatus::Running | ServerStatus::Stopped)) => Ok(status),
        _ => Err(Error::InvalidAttribute {
            name: "status".to_string(),
            reason: format!("must be running or stopped, got {}", status),
        }),
    }
}
