//! Thin HTTP client for the cloudscale.ch API.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::config::Config;
use crate::consts::USER_AGENT;
use crate::error::{Error, Result};

/// Authenticated API client.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: String,
    wait_timeout: Duration,
    import_timeout: Duration,
    poll_interval: Duration,
}

impl Client {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            wait_timeout: config.wait_timeout,
            import_timeout: config.import_timeout,
            poll_interval: config.poll_interval,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    pub fn import_timeout(&self) -> Duration {
        self.import_timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.token)
    }

    /// Fetches a single object.
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.send(Method::GET, path, self.request(Method::GET, path)).await?;
        Ok(resp.json::<T>().await?)
    }

    /// Fetches a collection. The API returns collections as plain JSON arrays.
    #[instrument(skip(self))]
    pub async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        self.get::<Vec<T>>(path).await
    }

    /// Creates an object and returns the API's representation of it.
    #[instrument(skip(self, body))]
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let req = self.request(Method::POST, path).json(body);
        let resp = self.send(Method::POST, path, req).await?;
        Ok(resp.json::<T>().await?)
    }

    /// Triggers an action endpoint such as `/servers/{uuid}/start`.
    #[instrument(skip(self))]
    pub async fn post_action(&self, path: &str) -> Result<()> {
        self.send(Method::POST, path, self.request(Method::POST, path))
            .await
            .map(|_| ())
    }

    /// Partially updates an object. The API answers with `204 No Content`.
    #[instrument(skip(self, body))]
    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let req = self.request(Method::PATCH, path).json(body);
        self.send(Method::PATCH, path, req).await.map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, self.request(Method::DELETE, path))
            .await
            .map(|_| ())
    }

    async fn send(&self, method: Method, path: &str, req: RequestBuilder) -> Result<Response> {
        debug!("{} {}", method, path);

        let resp = req.send().await.map_err(|err| {
            error!("Error making request: {:?}", err);
            err
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        if status == StatusCode::NOT_FOUND {
            debug!("{} {} returned 404", method, path);
            return Err(Error::NotFound {
                path: path.to_string(),
            });
        }

        let body = resp.text().await.unwrap_or_default();
        let message = error_message(status, &body);
        error!("{} {} failed with {}: {}", method, path, status, message);

        Err(Error::Api { status, message })
    }
}

/// Flattens an API error body into a single message.
///
/// The API answers either with `{"detail": "..."}` or with field-keyed lists of
/// messages such as `{"name": ["This field is required."]}`.
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => {
            let body = body.trim();
            return if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                body.to_string()
            };
        }
    };

    if let Some(Value::String(detail)) = parsed.get("detail") {
        return detail.clone();
    }

    parsed
        .iter()
        .map(|(field, messages)| {
            let text = match messages {
                Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" "),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{}: {}", field, text)
        })
        .collect::<Vec<_>>()
        .join("; ")
}
