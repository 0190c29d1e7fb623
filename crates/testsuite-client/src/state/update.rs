//! Body of the `control` testsuite action.

use serde::{Deserialize, Serialize};

/// How the service should refresh invalidated caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Full,
    Incremental,
}

/// `invalidate_caches` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInvalidation {
    pub update_type: UpdateType,

    /// Restrict invalidation to these caches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,

    /// Caches excluded from invalidation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names_blocklist: Option<Vec<String>>,
}

impl CacheInvalidation {
    /// Full invalidation of every cache except `blocklist`.
    pub fn full_except(blocklist: Vec<String>) -> Self {
        Self {
            update_type: UpdateType::Full,
            names: None,
            names_blocklist: Some(blocklist),
        }
    }

    /// Whether applying this directive leaves every cache fresh.
    ///
    /// Incremental or name-restricted updates may leave other caches stale.
    pub fn is_complete(&self) -> bool {
        self.update_type == UpdateType::Full
            && self.names.as_ref().map_or(true, |names| names.is_empty())
    }
}

/// Payload posted to the control action.
///
/// Absent fields leave the corresponding server-side state untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalidate_caches: Option<CacheInvalidation>,

    /// Sorted names of testpoints to enable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testpoints: Option<Vec<String>>,

    /// `Some(None)` is sent as `null` and disables mocked time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_now: Option<Option<String>>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reset_metrics: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_allowed_urls_extra: Option<Vec<String>>,
}

impl ControlUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the update carries no directive at all.
    pub fn is_empty(&self) -> bool {
        self.invalidate_caches.is_none()
            && self.testpoints.is_none()
            && self.mock_now.is_none()
            && !self.reset_metrics
            && self.http_allowed_urls_extra.is_none()
    }

    /// Update that only enables `testpoints`.
    pub fn testpoints_only<I, S>(testpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = testpoints.into_iter().map(Into::into).collect();
        names.sort();
        Self {
            testpoints: Some(names),
            ..Self::default()
        }
    }
}
