//! Manage cloudscale.ch infrastructure through a schema-driven provider.
//!
//! The [Provider] maps resource and data source type names such as
//! `cloudscale_server` to their implementations and builds an authenticated
//! [Client] from its configuration block. The API token is taken from the
//! `token` attribute or, when unset, from the `CLOUDSCALE_TOKEN` environment
//! variable.
//!
//! # Examples
//!
//! ```no_run
//! use cloudscale_provider::{Provider, ResourceData};
//! use serde_json::json;
//!
//! # async fn run() -> cloudscale_provider::Result<()> {
//! let provider = Provider::new();
//! let client = provider.configure(&json!({}))?;
//!
//! let mut data = ResourceData::from_json(json!({
//!     "name": "db-data",
//!     "size_gb": 50,
//!     "zone_slug": "lpg1",
//! }))?;
//! provider.create(&client, "cloudscale_volume", &mut data).await?;
//! println!("Created volume {:?}", data.id());
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "blocking")]
pub mod blocking;
pub mod client;
pub mod config;
pub mod consts;
pub mod error;
pub mod provider;
pub mod resource;
pub mod resources;
pub mod schema;
pub mod state;
pub(crate) mod waiter;

#[cfg(test)]
mod test_utils;

pub use crate::client::Client;
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::provider::Provider;
pub use crate::resource::{DataSource, Resource};
pub use crate::schema::{Attribute, Schema, ValueType};
pub use crate::state::ResourceData;
