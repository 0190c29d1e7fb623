//! Configuration for the testsuite client.

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Default transport timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Configuration shared by [`ServiceClient`](crate::ServiceClient) and
/// [`MonitorClient`](crate::MonitorClient).
///
/// Paths are templates relative to the client's base URL. The action path
/// must contain an `{action}` placeholder, e.g. `/tests/{action}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Template of the testsuite action handler (tests-control component).
    pub testsuite_action_path: Option<String>,

    /// Path of the server-monitor handler on the monitor listener.
    pub server_monitor_path: Option<String>,

    /// Caches excluded from the automatic full invalidation.
    pub cache_blocklist: Vec<String>,

    /// Header that receives a fresh span id on every request.
    pub span_id_header: Option<String>,

    /// Transport timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            testsuite_action_path: None,
            server_monitor_path: None,
            cache_blocklist: Vec::new(),
            span_id_header: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the testsuite action path template.
    pub fn with_testsuite_action_path(mut self, path: impl Into<String>) -> Self {
        self.testsuite_action_path = Some(path.into());
        self
    }

    /// Set the server monitor path.
    pub fn with_server_monitor_path(mut self, path: impl Into<String>) -> Self {
        self.server_monitor_path = Some(path.into());
        self
    }

    /// Set the cache blocklist.
    pub fn with_cache_blocklist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_blocklist = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the span id header name.
    pub fn with_span_id_header(mut self, header: impl Into<String>) -> Self {
        self.span_id_header = Some(header.into());
        self
    }

    /// Transport timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::ConfigLoad(e.to_string()))
    }

    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&text)?;
        debug!("Loaded testsuite client config from {}", path.display());
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Only fields still holding their default value are overridden, so
    /// explicitly configured values win.
    pub fn with_env_overrides(mut self) -> Self {
        if self.testsuite_action_path.is_none() {
            self.testsuite_action_path = non_empty_env("TESTSUITE_ACTION_PATH");
        }

        if self.server_monitor_path.is_none() {
            self.server_monitor_path = non_empty_env("TESTSUITE_SERVER_MONITOR_PATH");
        }

        if self.span_id_header.is_none() {
            self.span_id_header = non_empty_env("TESTSUITE_SPAN_ID_HEADER");
        }

        if self.request_timeout_secs == DEFAULT_REQUEST_TIMEOUT_SECS {
            if let Some(secs) =
                non_empty_env("TESTSUITE_REQUEST_TIMEOUT").and_then(|v| v.parse().ok())
            {
                self.request_timeout_secs = secs;
            }
        }

        self
    }

    /// Resolve the action path for `action`.
    pub(crate) fn action_path(&self, action: &str) -> Result<String> {
        let template = self.testsuite_action_path.as_deref().ok_or_else(|| {
            Error::Configuration("tests-control component is not properly configured".into())
        })?;
        Ok(template.replace("{action}", action))
    }

    /// Resolve the monitor path.
    pub(crate) fn monitor_path(&self) -> Result<&str> {
        self.server_monitor_path.as_deref().ok_or_else(|| {
            Error::Configuration("handler-server-monitor component is not configured".into())
        })
    }
}

/// Join a configured path onto a base URL without a trailing slash.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{}{}", base_url, path)
    } else {
        format!("{}/{}", base_url, path)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}
