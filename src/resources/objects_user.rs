//! Object storage users and their S3 keys.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::client::Client;
use crate::error::Result;
use crate::resource::{delete_ignoring_missing, gone_if_not_found, Lookup, Resource};
use crate::resources::{href_attribute, patch_changes, tags_attribute, tags_value, Tags};
use crate::schema::{Attribute, Schema, ValueType};
use crate::state::ResourceData;

pub const IDENTIFIER: &str = "cloudscale_objects_user";
const COLLECTION: &str = "/objects-users";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ObjectsUser {
    id: String,
    href: String,
    display_name: String,
    #[serde(default)]
    keys: Vec<Key>,
    #[serde(default)]
    tags: Tags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Key {
    access_key: String,
    secret_key: String,
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    display_name: &'a str,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    tags: Tags,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectsUserResource;

fn path(id: &str) -> String {
    format!("{}/{}", COLLECTION, id)
}

#[async_trait]
impl Resource for ObjectsUserResource {
    fn identifier(&self) -> &'static str {
        IDENTIFIER
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with_attribute("display_name", Attribute::required_string())
            .with_attribute("user_id", Attribute::computed_string())
            .with_attribute(
                "keys",
                Attribute::computed_only(ValueType::list(ValueType::Object(vec![
                    ("access_key", ValueType::String),
                    ("secret_key", ValueType::String),
                ])))
                .sensitive()
                .describe("S3 credentials of the user."),
            )
            .with_attribute("href", href_attribute())
            .with_attribute("tags", tags_attribute())
    }

    #[instrument(skip_all)]
    async fn create(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let req = CreateRequest {
            display_name: data.require_str("display_name")?,
            tags: data.get_string_map("tags"),
        };
        info!("Creating objects user {}", req.display_name);

        let user: ObjectsUser = client.post(COLLECTION, &req).await?;

        data.set_id(user.id.as_str());
        Self::flatten(&user, data);
        Ok(())
    }

    #[instrument(skip_all)]
    async fn read(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = client.get::<ObjectsUser>(&path(&id)).await;

        if let Some(user) = gone_if_not_found(result, data)? {
            Self::flatten(&user, data);
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn update(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let body = patch_changes(data, &[("display_name", "display_name"), ("tags", "tags")]);

        if !body.is_empty() {
            info!("Updating objects user {}", id);
            client.patch(&path(&id), &body).await?;
        }

        self.read(client, data).await
    }

    #[instrument(skip_all)]
    async fn delete(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        info!("Deleting objects user {}", id);

        delete_ignoring_missing(client, &path(&id)).await?;
        data.clear_id();
        Ok(())
    }
}

impl Lookup for ObjectsUserResource {
    type Item = ObjectsUser;

    const KIND: &'static str = "objects user";
    const COLLECTION: &'static str = COLLECTION;
    const FILTERS: &'static [&'static str] = &["display_name", "user_id"];

    fn item_id(item: &ObjectsUser) -> String {
        item.id.clone()
    }

    fn flatten(item: &ObjectsUser, data: &mut ResourceData) {
        data.set("href", item.href.as_str());
        data.set("user_id", item.id.as_str());
        data.set("display_name", item.display_name.as_str());
        data.set(
            "keys",
            item.keys
                .iter()
                .map(|k| json!({"access_key": k.access_key, "secret_key": k.secret_key}))
                .collect::<Vec<Value>>(),
        );
        data.set("tags", tags_value(&item.tags));
    }
}
