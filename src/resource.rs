//! Resource and data source contracts.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::state::ResourceData;

/// A remote object whose lifecycle the provider manages.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Registration name, e.g. `cloudscale_volume`.
    fn identifier(&self) -> &'static str;

    fn schema(&self) -> Schema;

    async fn create(&self, client: &Client, data: &mut ResourceData) -> Result<()>;

    /// Refreshes `data` from the API. Clears the id when the remote object is
    /// gone.
    async fn read(&self, client: &Client, data: &mut ResourceData) -> Result<()>;

    async fn update(&self, client: &Client, data: &mut ResourceData) -> Result<()>;

    async fn delete(&self, client: &Client, data: &mut ResourceData) -> Result<()>;

    /// Adopts an existing remote object by id.
    async fn import(&self, client: &Client, id: &str) -> Result<ResourceData> {
        let mut data = ResourceData::default();
        data.set_id(id);
        self.read(client, &mut data).await?;

        if data.id().is_none() {
            return Err(Error::NotFound {
                path: format!("{}/{}", self.identifier(), id),
            });
        }

        Ok(data)
    }
}

/// A read-only lookup of existing remote state.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn identifier(&self) -> &'static str;

    fn schema(&self) -> Schema;

    async fn read(&self, client: &Client, data: &mut ResourceData) -> Result<()>;
}

/// Treats a 404 as "the object is gone": clears the id and yields `None`.
pub(crate) fn gone_if_not_found<T>(
    result: Result<T>,
    data: &mut ResourceData,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => {
            warn!(
                "Object {} no longer exists, removing it from state",
                data.id().unwrap_or_default()
            );
            data.clear_id();
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Deletes `path`, treating an already deleted object as success.
pub(crate) async fn delete_ignoring_missing(client: &Client, path: &str) -> Result<()> {
    match client.delete(path).await {
        Err(err) if err.is_not_found() => {
            debug!("{} was already deleted", path);
            Ok(())
        }
        other => other,
    }
}

/// A resource whose collection can be searched by a data source.
pub(crate) trait Lookup: Resource + Default + 'static {
    type Item: DeserializeOwned + Send;

    /// Human readable name used in errors, e.g. `volume`.
    const KIND: &'static str;
    /// Collection path, e.g. `/volumes`.
    const COLLECTION: &'static str;
    /// Attributes a data source may filter on, besides `id`.
    const FILTERS: &'static [&'static str];

    fn item_id(item: &Self::Item) -> String;

    /// Writes the API representation into `data`, exactly as `read` does.
    fn flatten(item: &Self::Item, data: &mut ResourceData);
}

/// Data source finding exactly one object of a [Lookup] resource.
pub(crate) struct LookupDataSource<R> {
    resource: R,
}

impl<R: Lookup> LookupDataSource<R> {
    pub(crate) fn new() -> Self {
        Self {
            resource: R::default(),
        }
    }
}

#[async_trait]
impl<R: Lookup> DataSource for LookupDataSource<R> {
    fn identifier(&self) -> &'static str {
        self.resource.identifier()
    }

    fn schema(&self) -> Schema {
        self.resource.schema().lookup(R::FILTERS)
    }

    #[instrument(skip_all, fields(kind = R::KIND))]
    async fn read(&self, client: &Client, data: &mut ResourceData) -> Result<()> {
        let filters: Vec<(String, Value)> = std::iter::once("id")
            .chain(R::FILTERS.iter().copied())
            .filter_map(|key| data.get(key).map(|v| (key.to_string(), v.clone())))
            .collect();
        debug!("Looking up {} with filters {:?}", R::KIND, filters);

        let items = client.list::<R::Item>(R::COLLECTION).await?;

        let mut matches: Vec<ResourceData> = items
            .iter()
            .map(|item| {
                let mut candidate = ResourceData::default();
                candidate.set_id(R::item_id(item));
                R::flatten(item, &mut candidate);
                candidate
            })
            .filter(|candidate| {
                filters.iter().all(|(key, wanted)| match key.as_str() {
                    "id" => candidate.id() == wanted.as_str(),
                    _ => candidate.get(key) == Some(wanted),
                })
            })
            .collect();

        match matches.len() {
            0 => Err(Error::NoMatch {
                kind: R::KIND.to_string(),
            }),
            1 => {
                let found = matches.remove(0);
                let id = found.require_id()?.to_string();
                info!("Found {} {}", R::KIND, id);

                data.set_id(id.clone());
                data.values_mut().extend(found.into_values());
                data.set("id", id);
                Ok(())
            }
            count => Err(Error::AmbiguousMatch {
                kind: R::KIND.to_string(),
                count,
            }),
        }
    }
}
