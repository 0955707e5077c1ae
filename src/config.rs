//! Provider configuration.

use std::fmt;
use std::time::Duration;

use crate::client::Client;
use crate::consts::*;
use crate::error::Result;

/// Settings used to build an API [Client].
#[derive(Clone)]
pub struct Config {
    pub token: String,
    pub api_url: String,
    pub timeout: Duration,
    pub wait_timeout: Duration,
    pub import_timeout: Duration,
    pub poll_interval: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .field("wait_timeout", &self.wait_timeout)
            .field("import_timeout", &self.import_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl Config {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT),
            wait_timeout: Duration::from_secs(DEFAULT_WAIT_TIMEOUT),
            import_timeout: Duration::from_secs(DEFAULT_IMPORT_TIMEOUT),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn with_import_timeout(mut self, import_timeout: Duration) -> Self {
        self.import_timeout = import_timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Builds an authenticated API client from this configuration.
    pub fn client(&self) -> Result<Client> {
        Client::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new("secret");

        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT));
        assert_eq!(config.poll_interval, Duration::from_secs(DEFAULT_POLL_INTERVAL));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = Config::new("very-secret-token");
        let output = format!("{:?}", config);

        assert!(!output.contains("very-secret-token"));
        assert!(output.contains("<redacted>"));
    }

    #[test]
    fn test_builders() {
        let config = Config::new("secret")
            .with_api_url("http://localhost:1234")
            .with_poll_interval(Duration::from_millis(10));

        assert_eq!(config.api_url, "http://localhost:1234");
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }
}
