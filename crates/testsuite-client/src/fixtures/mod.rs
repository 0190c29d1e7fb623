//! Collaborators consumed by the client.
//!
//! The client never owns mocked time, the testpoint registry or log capture;
//! it reads and updates them through these traits. In-memory implementations
//! live in [`memory`] and are re-exported here.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::state::Observed;

pub mod memory;

pub use memory::{
    ApiCoverageCollector, LogCapture, MemoryLogCapture, MockedTime, Testpoints, TestpointsControl,
    UsageStat,
};

/// Source of the mocked clock the service should observe.
pub trait MockedTimeSource: Send + Sync {
    /// Whether mocked time is enabled for the current test.
    fn is_enabled(&self) -> bool;

    /// Current mocked time.
    fn now(&self) -> DateTime<Utc>;
}

/// Registry of testpoints handled by the current test.
pub trait TestpointRegistry: Send + Sync {
    /// Names of all registered testpoints.
    fn keys(&self) -> Vec<String>;

    fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }
}

/// Receiver of the testpoint set the service currently has enabled.
pub trait TestpointControl: Send + Sync {
    /// Replace the enabled set wholesale.
    fn set_enabled_testpoints(&self, testpoints: &Observed<BTreeSet<String>>);
}

/// Fixture that collects logs duplicated by the service.
#[async_trait]
pub trait LogCaptureFixture: Send + Sync {
    /// Begin collecting; the returned handle accumulates records.
    async fn start_capture(&self) -> Result<LogCapture>;

    /// Stop collecting into `capture`.
    async fn stop_capture(&self, capture: &LogCapture);
}

/// Reporter of which handlers the tests exercised.
pub trait ApiCoverageReport: Send + Sync {
    fn update_usage_stat(&self, path: &str, method: &str, status: u16, content_type: Option<&str>);
}

/// Mocked time that is always disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTime;

impl MockedTimeSource for DisabledTime {
    fn is_enabled(&self) -> bool {
        false
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Registry without testpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTestpoints;

impl TestpointRegistry for NoTestpoints {
    fn keys(&self) -> Vec<String> {
        Vec::new()
    }
}

impl TestpointControl for NoTestpoints {
    fn set_enabled_testpoints(&self, _testpoints: &Observed<BTreeSet<String>>) {}
}
