//! Error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the provider and its resources.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("Invalid value for attribute {name}: {reason}")]
    InvalidAttribute { name: String, reason: String },

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Attribute {0} is computed and cannot be configured")]
    ComputedAttribute(String),

    #[error("Changing attribute {0} requires replacing the resource")]
    RequiresReplacement(String),

    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    #[error("Unknown data source: {0}")]
    UnknownDataSource(String),

    #[error("No {kind} found matching the given filters")]
    NoMatch { kind: String },

    #[error("Found {count} {kind} items matching the given filters, expected exactly one")]
    AmbiguousMatch { kind: String, count: usize },

    #[error("Timed out after {seconds}s waiting for {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("Custom image import {uuid} failed: {message}")]
    ImportFailed { uuid: String, message: String },

    #[error("Server {0} entered the errored state")]
    ServerErrored(String),

    #[error("Resource has no id")]
    MissingId,
}

impl Error {
    /// Whether the remote object does not exist (anymore).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
