//! Custom images, created by importing a disk image from a URL.

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, info, instrument};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::resource::{delete_ignoring_missing, gone_if_not_found, Lookup, Resource};
use crate::resources::{
    href_attribute, patch_changes, string_list, tags_attribute, tags_value, Tags, ZoneRef,
};
use crate::schema::{Attribute, Schema, ValueType};
use crate::state::ResourceData;
use crate::waiter::{wait_for, WaitState};

pub const IDENTIFIER: &str = "cloudscale_custom_image";
const COLLECTION: &str = "/custom-images";
const IMPORT_COLLECTION: &str = "/custom-images/import";

/// Progress of an image import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ImportStatus {
    Started,
    InProgress,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CustomImage {
    uuid: String,
    href: String,
    name: String,
    slug: Option<String>,
    size_gb: Option<i64>,
    #[serde(default)]
    checksums: Tags,
    user_data_handling: String,
    firmware_type: Option<String>,
    #[serde(default)]
    zones: Vec<ZoneRef>,
    #[serde(default)]
    tags: Tags,
}

#[derive(Debug, Clone, Deserialize)]
struct CustomImageImport {
    uuid: String,
    status: String,
    custom_image: Option<ImageRef>,
    error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ImageRef {
    uuid: String,
}

#[derive(Debug, Serialize)]
struct ImportRequest<'a> {
    url: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    slug: Option<&'a str>,
    user_data_handling: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    firmware_type: Option<&'a str>,
    source_format: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    zones: Vec<String>,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    tags: Tags,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CustomImageResource;

fn path(id: &str) -> String {
    format!("{}/{}", COLLECTION, id)
}

impl CustomImageResource {
    /// Polls an import until it succeeds and returns the new image's UUID.
    async fn wait_for_import(&self, client: &Client, import_uuid: &str) -> Result<String> {
        let import_path = format!("{}/{}", IMPORT_COLLECTION, import_uuid);
        let import_path = import_path.as_str();

        wait_for(
            &format!("custom image import {}", import_uuid),
            client.import_timeout(),
            client.poll_interval(),
            move || async move {
                let import: CustomImageImport = client.get(import_path).await?;
                let status = ImportStatus::from_str(&import.status).map_err(|_| {
                    Error::InvalidAttribute {
                        name: "import_status".to_string(),
                        reason: format!("unexpected status {}", import.status),
                    }
                })?;
                debug!("Import {} is {}", import.uuid, status);

                match (status, import.custom_image) {
                    (ImportStatus::Success, Some(image)) => Ok(WaitState::Ready(image.uuid)),
                    (ImportStatus::Failed, _) => Err(Error::ImportFailed {
                        uuid: import.uuid,
                        message: import.error_message.unwrap_or_default(),
                    }),
                    _ => Ok(WaitState::Pending),
                }
            },
        )
        .await
    }
}

#[async_trait]
impl Resource for CustomImageResource {
    fn identifier(&self) -> &'static str {
        IDENTIFIER
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with_attribute(
                "import_url",
                Attribute::required_string()
                    .force_new()
                    .describe("HTTP(S) URL the image is downloaded from."),
            )
            .with_attribute(
                "import_source_format",
                Attribute::required_string()
                    .force_new()
                    .describe("Either `raw` or `qcow2`."),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute("slug", Attribute::optional_string())
            .with_attribute(
                "user_data_handling",
                Attribute::required_string()
                    .describe("Either `pass-through` or `extend-cloud-config`."),
            )
            .with_attribute(
                "firmware_type",
                Attribute::optional_string()
                    .computed()
                    .force_new()
                    .describe("Either `bios` or `uefi`."),
            )
            .with_attribute(
                "zone_slugs",
                Attribute::optional_string_list().computed().force_new(),
            )
            .with_attribute("size_gb", Attribute::computed_int())
            .with_attribute(
                "checksums",
                Attribute::computed_only(ValueType::map(ValueType::String)),
            )
            .with_attribute("import_uuid", Attribute::computed_string())
            .with_attribute("import_status", Attribute::computed_string())
            .with_attribute("href", href_attribute())
            .with_attribute("tags", tags_attribute())
    }

    #[instrument(skip_all)]
    async fn create(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let req = ImportRequest {
            url: data.require_str("import_url")?,
            name: data.require_str("name")?,
            slug: data.get_str("slug"),
            user_data_handling: data.require_str("user_data_handling")?,
            firmware_type: data.get_str("firmware_type"),
            source_format: data.require_str("import_source_format")?,
            zones: data.get_string_list("zone_slugs"),
            tags: data.get_string_map("tags"),
        };
        info!("Importing custom image {} from {}", req.name, req.url);

        let import: CustomImageImport = client.post(IMPORT_COLLECTION, &req).await?;
        data.set("import_uuid", import.uuid.as_str());

        let image_uuid = self.wait_for_import(client, &import.uuid).await?;
        info!("Imported custom image {}", image_uuid);

        data.set("import_status", ImportStatus::Success.to_string());
        data.set_id(image_uuid);
        self.read(client, data).await
    }

    #[instrument(skip_all)]
    async fn read(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = client.get::<CustomImage>(&path(&id)).await;

        if let Some(image) = gone_if_not_found(result, data)? {
            Self::flatten(&image, data);
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
                ("slug", "slug"),
                ("user_data_handling", "user_data_handling"),
                ("tags", "tags"),
            ],
        );

        if !body.is_empty() {
            info!("Updating custom image {}", id);
            client.patch(&path(&id), &body).await?;
        }

        self.read(client, data).await
    }

    #[instrument(skip_all)]
    async fn delete(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let id = data.require_id()?.to_string();
        info!("Deleting custom image {}", id);

        delete_ignoring_missing(client, &path(&id)).await?;
        data.clear_id();
        Ok(())
    }
}

impl Lookup for CustomImageResource {
    type Item = CustomImage;

    const KIND: &'static str = "custom image";
    const COLLECTION: &'static str = COLLECTION;
    const FILTERS: &'static [&'static str] =
        &["name", "slug", "user_data_handling", "firmware_type"];

    fn item_id(item: &CustomImage) -> String {
        item.uuid.clone()
    }

    fn flatten(item: &CustomImage, data: &mut ResourceData) {
        data.set("href", item.href.as_str());
        data.set("name", item.name.as_str());
        data.set_opt("slug", item.slug.as_deref());
        data.set_opt("size_gb", item.size_gb);
        data.set("checksums", tags_value(&item.checksums));
        data.set("user_data_handling", item.user_data_handling.as_str());
        data.set_opt("firmware_type", item.firmware_type.as_deref());
        let zones: Vec<String> = item.zones.iter().map(|z| z.slug.clone()).collect();
        data.set("zone_slugs", string_list(&zones));
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

    fn config() -> ResourceData {
        ResourceData::new(object(json!({
            "import_url": "https://example.com/images/alpine.raw",
            "import_source_format": "raw",
            "name": "alpine",
            "slug": "alpine-3",
            "user_data_handling": "pass-through",
            "zone_slugs": ["lpg1"],
        })))
    }

    #[test]
    fn test_import_status_parsing() {
        assert_eq!(ImportStatus::from_str("in_progress").unwrap(), ImportStatus::InProgress);
        assert_eq!(ImportStatus::Success.to_string(), "success");
        assert!(ImportStatus::from_str("queued").is_err());
    }

    #[tokio::test]
    async fn test_create_waits_for_import() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(url_path("/custom-images/import"))
            .and(body_json(json!({
                "url": "https://example.com/images/alpine.raw",
                "name": "alpine",
                "slug": "alpine-3",
                "user_data_handling": "pass-through",
                "source_format": "raw",
                "zones": ["lpg1"],
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "uuid": "imp-1",
                "status": "started",
                "custom_image": {"uuid": "img-1"},
                "error_message": "",
            })))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/custom-images/import/imp-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uuid": "imp-1",
                "status": "in_progress",
                "custom_image": {"uuid": "img-1"},
            })))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/custom-images/import/imp-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uuid": "imp-1",
                "status": "success",
                "custom_image": {"uuid": "img-1"},
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/custom-images/img-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uuid": "img-1",
                "href": "https://api.cloudscale.ch/v1/custom-images/img-1",
                "name": "alpine",
                "slug": "alpine-3",
                "size_gb": 1,
                "checksums": {"sha256": "abc"},
                "user_data_handling": "pass-through",
                "firmware_type": "bios",
                "zones": [{"slug": "lpg1"}],
                "tags": {},
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut data = config();
        CustomImageResource
            .create(&client(&mock_server.uri()), &mut data)
            .await
            .unwrap();

        assert_eq!(data.id(), Some("img-1"));
        assert_eq!(data.get_str("import_uuid"), Some("imp-1"));
        assert_eq!(data.get_str("import_status"), Some("success"));
        assert_eq!(data.get_str("firmware_type"), Some("bios"));
        assert_eq!(data.get_string_map("checksums")["sha256"], "abc");
    }

    #[tokio::test]
    async fn test_create_reports_failed_import() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(url_path("/custom-images/import"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "uuid": "imp-2",
                "status": "started",
                "custom_image": null,
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/custom-images/import/imp-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uuid": "imp-2",
                "status": "failed",
                "custom_image": null,
                "error_message": "Expected image of type raw, got qcow2",
            })))
            .mount(&mock_server)
            .await;

        let mut data = config();
        let err = CustomImageResource
            .create(&client(&mock_server.uri()), &mut data)
            .await
            .unwrap_err();

        match err {
            Error::ImportFailed { uuid, message } => {
                assert_eq!(uuid, "imp-2");
                assert!(message.contains("qcow2"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(data.id().is_none());
    }

    #[tokio::test]
    async fn test_read_removes_missing_image() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/custom-images/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut data = ResourceData::from_state("gone", object(json!({"name": "alpine"})));
        CustomImageResource
            .read(&client(&mock_server.uri()), &mut data)
            .await
            .unwrap();

        assert!(data.id().is_none());
    }
}
