//! Cleanup requests that must reach the service even if a scope is cancelled.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::fixtures::{LogCapture, LogCaptureFixture};

/// POST fired from `Drop` unless [`disarm`](Self::disarm)ed.
///
/// Scoped operations (spawned tasks, log duplication) arm one of these
/// before running the caller's future. On the normal path the scope sends
/// the cleanup itself and disarms the guard; if the future is dropped
/// midway the guard spawns the request on the ambient tokio runtime.
pub(crate) struct DeferredAction {
    http: reqwest::Client,
    url: String,
    body: Value,
    armed: bool,
}

impl DeferredAction {
    pub(crate) fn new(http: reqwest::Client, url: String, body: Value) -> Self {
        Self {
            http,
            url,
            body,
            armed: true,
        }
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for DeferredAction {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let http = self.http.clone();
        let url = std::mem::take(&mut self.url);
        let body = std::mem::take(&mut self.body);

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No tokio runtime to send cleanup request to {}", url);
                return;
            }
        };

        debug!("Scope dropped early, sending cleanup request to {}", url);
        handle.spawn(async move {
            match http.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Cleanup request to {} succeeded", url);
                }
                Ok(response) => {
                    warn!(
                        "Cleanup request to {} failed: status {}",
                        url,
                        response.status()
                    );
                }
                Err(e) => {
                    warn!("Cleanup request to {} failed: {}", url, e);
                }
            }
        });
    }
}

/// Stops a local log capture from `Drop` unless [`disarm`](Self::disarm)ed.
///
/// Pairs with the [`DeferredAction`] that turns off service-side log
/// duplication, so a cancelled scope leaves neither side capturing.
pub(crate) struct DeferredCaptureStop {
    fixture: Arc<dyn LogCaptureFixture>,
    capture: Option<LogCapture>,
}

impl DeferredCaptureStop {
    pub(crate) fn new(fixture: Arc<dyn LogCaptureFixture>, capture: LogCapture) -> Self {
        Self {
            fixture,
            capture: Some(capture),
        }
    }

    pub(crate) fn disarm(mut self) {
        self.capture = None;
    }
}

impl Drop for DeferredCaptureStop {
    fn drop(&mut self) {
        let Some(capture) = self.capture.take() else {
            return;
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No tokio runtime to stop log capture");
                return;
            }
        };

        debug!("Scope dropped early, stopping log capture");
        let fixture = Arc::clone(&self.fixture);
        handle.spawn(async move {
            fixture.stop_capture(&capture).await;
        });
    }
}

/// Combine a scope's result with the result of its cleanup.
///
/// The scope's own error wins; a cleanup failure after a failed scope is
/// only logged.
pub(crate) fn finish_scope<T>(
    result: crate::Result<T>,
    cleanup: crate::Result<()>,
    what: &str,
) -> crate::Result<T> {
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup_err)) => {
            warn!("{} cleanup failed after scope error: {}", what, cleanup_err);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_finish_scope_prefers_scope_error() {
        let result: crate::Result<()> = finish_scope(
            Err(Error::Configuration("scope".into())),
            Err(Error::Configuration("cleanup".into())),
            "test",
        );
        match result {
            Err(Error::Configuration(msg)) => assert_eq!(msg, "scope"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_finish_scope_surfaces_cleanup_error() {
        let result = finish_scope(Ok(1), Err(Error::Configuration("cleanup".into())), "test");
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert_eq!(finish_scope(Ok(1), Ok(()), "test").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dropped_capture_stop_stops_fixture() {
        use crate::fixtures::MemoryLogCapture;

        let fixture = Arc::new(MemoryLogCapture::new());
        let capture = fixture.start_capture().await.unwrap();
        assert!(fixture.is_capturing());

        drop(DeferredCaptureStop::new(fixture.clone(), capture));
        for _ in 0..100 {
            if !fixture.is_capturing() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!fixture.is_capturing());
    }

    #[tokio::test]
    async fn test_disarmed_capture_stop_keeps_capturing() {
        use crate::fixtures::MemoryLogCapture;

        let fixture = Arc::new(MemoryLogCapture::new());
        let capture = fixture.start_capture().await.unwrap();

        DeferredCaptureStop::new(fixture.clone(), capture).disarm();
        tokio::task::yield_now().await;
        assert!(fixture.is_capturing());
    }

    #[test]
    fn test_disarmed_action_outside_runtime_is_silent() {
        let action = DeferredAction::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/tests/log_capture".into(),
            Value::Null,
        );
        action.disarm();

        // Armed guard dropped without a runtime only logs.
        drop(DeferredAction::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/tests/log_capture".into(),
            Value::Null,
        ));
    }
}
