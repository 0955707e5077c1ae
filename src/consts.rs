pub const DEFAULT_API_URL: &str = "https://api.cloudscale.ch/v1";
pub const TOKEN_ENV_VAR: &str = "CLOUDSCALE_TOKEN";
pub const API_URL_ENV_VAR: &str = "CLOUDSCALE_API_URL";

pub const DEFAULT_REQUEST_TIMEOUT: u64 = 60; // seconds
pub const DEFAULT_WAIT_TIMEOUT: u64 = 300; // seconds
pub const DEFAULT_IMPORT_TIMEOUT: u64 = 1800; // seconds
pub const DEFAULT_POLL_INTERVAL: u64 = 2; // seconds

pub(crate) const USER_AGENT: &str = concat!("cloudscale-provider/", env!("CARGO_PKG_VERSION"));
