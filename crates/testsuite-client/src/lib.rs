//! Testsuite client for functional tests
//!
//! Drives a running service from a test harness over HTTP: cache
//! invalidation, mocked time, testpoints, periodic tasks, ad-hoc testsuite
//! tasks, metrics and log capture.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use testsuite_client::{ClientConfig, RequestOptions, ServiceClient};
//! use testsuite_client::fixtures::{MockedTime, Testpoints, TestpointsControl};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), testsuite_client::Error> {
//! let config = ClientConfig::new().with_testsuite_action_path("/tests/{action}");
//! let client = ServiceClient::builder("http://127.0.0.1:8080", config)
//!     .mocked_time(Arc::new(MockedTime::new(chrono::Utc::now())))
//!     .testpoints(Arc::new(Testpoints::new()))
//!     .testpoint_control(Arc::new(TestpointsControl::new()))
//!     .build()?;
//!
//! // First request syncs caches, mocked time and testpoints.
//! let response = client.get("/ping", RequestOptions::new()).await?;
//! assert!(response.is_success());
//!
//! client.run_task("sample-task").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ServiceClient ──► StateManager ──► ControlUpdate ──► POST {action=control}
//!       │
//!       ├──► task protocol ──► POST {action=task_*}
//!       └──► PeriodicTasksState ──► POST {action=suspend_periodic_tasks}
//!
//! MonitorClient ──► GET server_monitor_path
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

mod cleanup;
mod client;
mod config;
mod error;
pub mod fixtures;
mod monitor;
mod periodic;
mod request;
mod response;
pub mod state;
mod sync;
pub mod task;

pub use client::{ServiceClient, ServiceClientBuilder, TestsControl};
pub use config::{ClientConfig, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::{Error, Result};
pub use monitor::{Metric, MetricsQuery, MonitorClient};
pub use periodic::{PeriodicTasksState, SharedPeriodicTasks};
pub use request::RequestOptions;
pub use response::Response;
pub use state::{ControlUpdate, Observed, State, StateManager};

pub use reqwest::{Method, StatusCode};
