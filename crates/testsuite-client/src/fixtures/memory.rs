//! In-memory collaborator implementations.
//!
//! - [`MockedTime`] - controllable clock
//! - [`Testpoints`] - testpoint registry keyed by name
//! - [`TestpointsControl`] - records the set the service has enabled
//! - [`MemoryLogCapture`] - log-capture fixture fed by the harness
//! - [`ApiCoverageCollector`] - counts handler usage

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{
    ApiCoverageReport, LogCaptureFixture, MockedTimeSource, TestpointControl, TestpointRegistry,
};
use crate::error::Result;
use crate::state::Observed;
use crate::sync::lock;

/// Controllable mocked clock.
#[derive(Debug)]
pub struct MockedTime {
    enabled: Mutex<bool>,
    now: Mutex<DateTime<Utc>>,
}

impl MockedTime {
    /// Enabled clock starting at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            enabled: Mutex::new(true),
            now: Mutex::new(now),
        }
    }

    /// Disabled clock; the service keeps its real time.
    pub fn disabled() -> Self {
        Self {
            enabled: Mutex::new(false),
            now: Mutex::new(Utc::now()),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        *lock(&self.enabled, "mocked time") = enabled;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now, "mocked time") = now;
    }

    /// Advance the clock by `delta`.
    pub fn sleep(&self, delta: Duration) {
        let mut now = lock(&self.now, "mocked time");
        *now += delta;
    }
}

impl MockedTimeSource for MockedTime {
    fn is_enabled(&self) -> bool {
        *lock(&self.enabled, "mocked time")
    }

    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now, "mocked time")
    }
}

/// Testpoint registry: names plus hit counters.
#[derive(Debug, Default)]
pub struct Testpoints {
    hits: Mutex<BTreeMap<String, u64>>,
}

impl Testpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>) {
        lock(&self.hits, "testpoints").entry(name.into()).or_insert(0);
    }

    pub fn unregister(&self, name: &str) -> bool {
        lock(&self.hits, "testpoints").remove(name).is_some()
    }

    /// Record a hit; returns false for unknown testpoints.
    pub fn hit(&self, name: &str) -> bool {
        match lock(&self.hits, "testpoints").get_mut(name) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    pub fn times_called(&self, name: &str) -> u64 {
        lock(&self.hits, "testpoints").get(name).copied().unwrap_or(0)
    }
}

impl TestpointRegistry for Testpoints {
    fn keys(&self) -> Vec<String> {
        lock(&self.hits, "testpoints").keys().cloned().collect()
    }
}

/// Holds whatever testpoint set was last pushed by the state manager.
#[derive(Debug)]
pub struct TestpointsControl {
    enabled: Mutex<Observed<BTreeSet<String>>>,
}

impl Default for TestpointsControl {
    fn default() -> Self {
        Self {
            enabled: Mutex::new(Observed::Unknown),
        }
    }
}

impl TestpointsControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled_testpoints(&self) -> Observed<BTreeSet<String>> {
        lock(&self.enabled, "testpoint control").clone()
    }
}

impl TestpointControl for TestpointsControl {
    fn set_enabled_testpoints(&self, testpoints: &Observed<BTreeSet<String>>) {
        *lock(&self.enabled, "testpoint control") = testpoints.clone();
    }
}

/// Handle to captured log lines.
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        lock(&self.lines, "log capture").push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines, "log capture").clone()
    }

    /// Lines containing `text`.
    pub fn select(&self, text: &str) -> Vec<String> {
        lock(&self.lines, "log capture")
            .iter()
            .filter(|line| line.contains(text))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.lines, "log capture").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Log-capture fixture that routes [`ingest`](Self::ingest)ed lines into the
/// active capture.
#[derive(Debug, Default)]
pub struct MemoryLogCapture {
    active: Mutex<Option<LogCapture>>,
}

impl MemoryLogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a line; dropped when no capture is active.
    pub fn ingest(&self, line: impl Into<String>) -> bool {
        match lock(&self.active, "log capture").as_ref() {
            Some(capture) => {
                capture.push(line);
                true
            }
            None => false,
        }
    }

    pub fn is_capturing(&self) -> bool {
        lock(&self.active, "log capture").is_some()
    }
}

#[async_trait]
impl LogCaptureFixture for MemoryLogCapture {
    async fn start_capture(&self) -> Result<LogCapture> {
        let capture = LogCapture::new();
        *lock(&self.active, "log capture") = Some(capture.clone());
        Ok(capture)
    }

    async fn stop_capture(&self, _capture: &LogCapture) {
        *lock(&self.active, "log capture") = None;
    }
}

/// One `(path, method, status)` usage bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UsageStat {
    pub path: String,
    pub method: String,
    pub status: u16,
    pub content_type: Option<String>,
}

/// Counts requests per handler for API coverage reports.
#[derive(Debug, Default)]
pub struct ApiCoverageCollector {
    usage: Mutex<BTreeMap<UsageStat, u64>>,
}

impl ApiCoverageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn usage(&self) -> BTreeMap<UsageStat, u64> {
        lock(&self.usage, "api coverage").clone()
    }

    /// Distinct `(method, path)` pairs seen so far.
    pub fn covered(&self) -> BTreeSet<(String, String)> {
        lock(&self.usage, "api coverage")
            .keys()
            .map(|stat| (stat.method.clone(), stat.path.clone()))
            .collect()
    }
}

impl ApiCoverageReport for ApiCoverageCollector {
    fn update_usage_stat(&self, path: &str, method: &str, status: u16, content_type: Option<&str>) {
        let stat = UsageStat {
            path: path.to_string(),
            method: method.to_string(),
            status,
            content_type: content_type.map(str::to_string),
        };
        *lock(&self.usage, "api coverage").entry(stat).or_insert(0) += 1;
    }
}
