//! API endpoint configuration
//!
//! Resolves which backend the client talks to: an explicit URL override,
//! a named environment, or a hostname-based fallback.

use log::{debug, info};
use std::time::Duration;

const PRODUCTION_API_URL: &str = "https://api.agentworkbench.io";
const STAGING_API_URL: &str = "https://staging-api.agentworkbench.io";
const LOCAL_API_URL: &str = "http://localhost:8000";

/// Explicit base-URL override, takes precedence over everything else
const URL_OVERRIDE_VAR: &str = "WORKBENCH_API_URL";
/// Named environment selection ("production", "staging", "local")
const ENVIRONMENT_VAR: &str = "WORKBENCH_ENV";

/// Requests that take longer than this are reported as errors rather than
/// left hanging (the UI must never be stuck on a login that won't resolve).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiEnvironment {
    Production,
    Staging,
    Local,
}

impl ApiEnvironment {
    /// Base URL for this environment
    pub fn base_url(&self) -> &'static str {
        match self {
            ApiEnvironment::Production => PRODUCTION_API_URL,
            ApiEnvironment::Staging => STAGING_API_URL,
            ApiEnvironment::Local => LOCAL_API_URL,
        }
    }

    /// Parse an environment name as found in `WORKBENCH_ENV`
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(ApiEnvironment::Production),
            "staging" | "stage" => Some(ApiEnvironment::Staging),
            "local" | "dev" | "development" => Some(ApiEnvironment::Local),
            _ => None,
        }
    }

    /// Pick an environment from a machine hostname.
    ///
    /// Loopback names select the local backend, `staging.`-prefixed hosts the
    /// staging one, everything else production.
    pub fn from_hostname(host: &str) -> Self {
        let host = host.trim().to_ascii_lowercase();
        if host == "localhost" || host == "127.0.0.1" || host == "::1" {
            ApiEnvironment::Local
        } else if host.starts_with("staging.") || host.starts_with("staging-") {
            ApiEnvironment::Staging
        } else {
            ApiEnvironment::Production
        }
    }
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the backend, without a trailing slash requirement
    pub base_url: String,
    /// Per-request deadline
    pub request_timeout: Duration,
}

impl ApiConfig {
    /// Build a config for an explicit base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Resolve the config from process environment variables.
    ///
    /// Order: `WORKBENCH_API_URL` override, `WORKBENCH_ENV` name, hostname
    /// fallback, production default.
    pub fn from_env() -> Self {
        let base_url = resolve_base_url(
            |name| std::env::var(name).ok(),
            std::env::var("HOSTNAME").ok().as_deref(),
        );
        info!("API base URL: {}", base_url);
        Self::new(base_url)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(PRODUCTION_API_URL)
    }
}

/// Pure resolution logic, separated from process state so tests can drive it
/// with a closure instead of mutating the environment.
pub fn resolve_base_url(
    lookup: impl Fn(&str) -> Option<String>,
    hostname: Option<&str>,
) -> String {
    if let Some(url) = lookup(URL_OVERRIDE_VAR) {
        let url = url.trim();
        if !url.is_empty() {
            debug!("Using base URL override from {}", URL_OVERRIDE_VAR);
            return url.to_string();
        }
    }

    if let Some(name) = lookup(ENVIRONMENT_VAR) {
        if let Some(env) = ApiEnvironment::from_name(&name) {
            debug!("Selected {:?} environment from {}", env, ENVIRONMENT_VAR);
            return env.base_url().to_string();
        }
        debug!("Unrecognized {} value: {}", ENVIRONMENT_VAR, name);
    }

    if let Some(host) = hostname {
        let env = ApiEnvironment::from_hostname(host);
        debug!("Selected {:?} environment from hostname {}", env, host);
        return env.base_url().to_string();
    }

    PRODUCTION_API_URL.to_string()
}
