//! Service client: requests to the service under test plus testsuite control.
//!
//! Every request first reconciles server-side test state through the
//! [`StateManager`]; only the `control` action itself bypasses that step.

use std::future::Future;
use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cleanup::{finish_scope, DeferredAction, DeferredCaptureStop};
use crate::config::{join_url, ClientConfig};
use crate::error::{Error, Result};
use crate::fixtures::{
    ApiCoverageReport, DisabledTime, LogCapture, LogCaptureFixture, MockedTimeSource,
    NoTestpoints, TestpointControl, TestpointRegistry,
};
use crate::periodic::SharedPeriodicTasks;
use crate::request::RequestOptions;
use crate::response::Response;
use crate::state::{CacheInvalidation, ControlUpdate, StateManager, UpdateType};
use crate::sync::lock;
use crate::task::{
    check_task_response, TaskNameRequest, TaskResponse, TaskStopRequest, ACTION_TASKS_LIST,
    ACTION_TASK_RUN, ACTION_TASK_SPAWN, ACTION_TASK_STOP,
};

const ACTION_CONTROL: &str = "control";
const ACTION_RUN_PERIODIC_TASK: &str = "run_periodic_task";
const ACTION_SUSPEND_PERIODIC_TASKS: &str = "suspend_periodic_tasks";
const ACTION_WRITE_CACHE_DUMPS: &str = "write_cache_dumps";
const ACTION_READ_CACHE_DUMPS: &str = "read_cache_dumps";
const ACTION_RESET_METRICS: &str = "reset_metrics";
const ACTION_LOG_CAPTURE: &str = "log_capture";

/// Options of [`ServiceClient::tests_control`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestsControl {
    pub invalidate_caches: bool,
    /// `false` requests an incremental cache update.
    pub clean_update: bool,
    pub cache_names: Option<Vec<String>>,
    pub reset_metrics: bool,
    pub http_allowed_urls_extra: Option<Vec<String>>,
}

impl Default for TestsControl {
    fn default() -> Self {
        Self {
            invalidate_caches: true,
            clean_update: true,
            cache_names: None,
            reset_metrics: false,
            http_allowed_urls_extra: None,
        }
    }
}

impl TestsControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate_caches(mut self, enabled: bool) -> Self {
        self.invalidate_caches = enabled;
        self
    }

    pub fn clean_update(mut self, clean: bool) -> Self {
        self.clean_update = clean;
        self
    }

    pub fn cache_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_names = Some(owned_names(names));
        self
    }

    pub fn reset_metrics(mut self, reset: bool) -> Self {
        self.reset_metrics = reset;
        self
    }

    pub fn http_allowed_urls_extra<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.http_allowed_urls_extra = Some(owned_names(urls));
        self
    }

    /// Whether the caller wants a partial or incremental invalidation.
    fn is_partial(&self) -> bool {
        !self.clean_update
            || self
                .cache_names
                .as_ref()
                .is_some_and(|names| !names.is_empty())
    }
}

/// Builder for [`ServiceClient`].
pub struct ServiceClientBuilder {
    base_url: String,
    config: ClientConfig,
    http: Option<reqwest::Client>,
    mocked_time: Arc<dyn MockedTimeSource>,
    testpoints: Arc<dyn TestpointRegistry>,
    testpoint_control: Arc<dyn TestpointControl>,
    log_capture: Option<Arc<dyn LogCaptureFixture>>,
    api_coverage: Option<Arc<dyn ApiCoverageReport>>,
    periodic_tasks: Option<SharedPeriodicTasks>,
}

impl ServiceClientBuilder {
    pub fn mocked_time(mut self, mocked_time: Arc<dyn MockedTimeSource>) -> Self {
        self.mocked_time = mocked_time;
        self
    }

    pub fn testpoints(mut self, testpoints: Arc<dyn TestpointRegistry>) -> Self {
        self.testpoints = testpoints;
        self
    }

    pub fn testpoint_control(mut self, control: Arc<dyn TestpointControl>) -> Self {
        self.testpoint_control = control;
        self
    }

    pub fn log_capture(mut self, fixture: Arc<dyn LogCaptureFixture>) -> Self {
        self.log_capture = Some(fixture);
        self
    }

    pub fn api_coverage(mut self, report: Arc<dyn ApiCoverageReport>) -> Self {
        self.api_coverage = Some(report);
        self
    }

    pub fn periodic_tasks(mut self, state: SharedPeriodicTasks) -> Self {
        self.periodic_tasks = Some(state);
        self
    }

    /// Use a preconfigured transport instead of building one from config.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<ServiceClient> {
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .timeout(self.config.request_timeout())
                .build()?,
        };

        let state = StateManager::new(
            self.mocked_time,
            Arc::clone(&self.testpoints),
            self.testpoint_control,
            self.config.cache_blocklist.clone(),
        );

        Ok(ServiceClient {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            http,
            config: self.config,
            state,
            testpoints: self.testpoints,
            log_capture: self.log_capture,
            api_coverage: self.api_coverage,
            periodic_tasks: self.periodic_tasks,
        })
    }
}

/// Client of a running service under test.
///
/// Methods take `&self`; callers must not run two state-mutating calls on the
/// same client concurrently.
pub struct ServiceClient {
    base_url: String,
    http: reqwest::Client,
    config: ClientConfig,
    state: StateManager,
    testpoints: Arc<dyn TestpointRegistry>,
    log_capture: Option<Arc<dyn LogCaptureFixture>>,
    api_coverage: Option<Arc<dyn ApiCoverageReport>>,
    periodic_tasks: Option<SharedPeriodicTasks>,
}

impl ServiceClient {
    /// Start building a client for the service listening at `base_url`.
    pub fn builder(base_url: impl Into<String>, config: ClientConfig) -> ServiceClientBuilder {
        ServiceClientBuilder {
            base_url: base_url.into(),
            config,
            http: None,
            mocked_time: Arc::new(DisabledTime),
            testpoints: Arc::new(NoTestpoints),
            testpoint_control: Arc::new(NoTestpoints),
            log_capture: None,
            api_coverage: None,
            periodic_tasks: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// State manager tracking server-side test state.
    pub fn state_manager(&self) -> &StateManager {
        &self.state
    }

    // ========================================================================
    // Generic requests
    // ========================================================================

    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::GET, path, options).await
    }

    pub async fn post(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::POST, path, options).await
    }

    pub async fn put(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::PUT, path, options).await
    }

    pub async fn patch(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::PATCH, path, options).await
    }

    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::DELETE, path, options).await
    }

    pub async fn options(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::OPTIONS, path, options).await
    }

    /// Request with an arbitrary method, after syncing server state.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Response> {
        self.update_server_state().await?;
        self.dispatch(method, path, options).await
    }

    /// Send a request without syncing server state.
    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Response> {
        let mut request = self.http.request(method.clone(), self.url(path));

        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &options.bearer {
            request = request.bearer_auth(token);
        }
        if let Some(ip) = &options.x_real_ip {
            request = request.header("X-Real-IP", ip.as_str());
        }
        if let Some(header) = &self.config.span_id_header {
            request = request.header(header.as_str(), Uuid::new_v4().simple().to_string());
        }
        if let Some(body) = &options.json {
            request = request.json(body);
        } else if let Some(body) = options.body {
            request = request.body(body);
        }

        debug!("{} {}", method, path);
        let response = Response::from_reqwest(request.send().await?).await?;

        if let Some(report) = &self.api_coverage {
            report.update_usage_stat(
                path,
                method.as_str(),
                response.status_code(),
                response.content_type(),
            );
        }

        Ok(response)
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    // ========================================================================
    // State synchronization
    // ========================================================================

    /// Send a `tests/control` request built from `options` plus any pending
    /// state update. Returns the service's JSON answer.
    pub async fn tests_control(&self, options: TestsControl) -> Result<Value> {
        let mut update = self.state.get_pending_update();

        let partial = options.invalidate_caches && options.is_partial();
        if update.invalidate_caches.is_some() && partial {
            warn!("Manual cache invalidation leads to indirect initial full cache invalidation");
            self.update_server_state().await?;
            update = ControlUpdate::new();
        }

        if options.invalidate_caches {
            let update_type = if options.clean_update {
                UpdateType::Full
            } else {
                UpdateType::Incremental
            };
            update.invalidate_caches = Some(CacheInvalidation {
                update_type,
                names: options.cache_names.filter(|names| !names.is_empty()),
                names_blocklist: None,
            });
        }
        if options.reset_metrics {
            update.reset_metrics = true;
        }
        if let Some(urls) = options.http_allowed_urls_extra {
            update.http_allowed_urls_extra = Some(urls);
        }

        self.control(&update).await
    }

    /// Invalidate caches; all of them unless `cache_names` is given.
    pub async fn invalidate_caches(
        &self,
        clean_update: bool,
        cache_names: Option<Vec<String>>,
    ) -> Result<()> {
        let options = TestsControl {
            clean_update,
            cache_names,
            ..TestsControl::default()
        };
        self.tests_control(options).await?;
        Ok(())
    }

    /// Bring server-side caches, mocked time and testpoints up to date.
    /// Does nothing when the service is already in sync.
    pub async fn update_server_state(&self) -> Result<()> {
        let pending = self.state.get_pending_update();
        if pending.is_empty() {
            return Ok(());
        }
        self.control(&pending).await?;
        Ok(())
    }

    /// Tell the service which testpoints the test handles.
    ///
    /// With `no_auto_cache_cleanup` only the testpoint list is sent;
    /// otherwise the full pending update goes out, caches included.
    pub async fn enable_testpoints(&self, no_auto_cache_cleanup: bool) -> Result<()> {
        if self.testpoints.is_empty() {
            return Ok(());
        }
        if no_auto_cache_cleanup {
            let update = ControlUpdate::testpoints_only(self.testpoints.keys());
            self.control(&update).await?;
            Ok(())
        } else {
            self.update_server_state().await
        }
    }

    /// Post `update` to the control action inside a state transaction.
    async fn control(&self, update: &ControlUpdate) -> Result<Value> {
        let path = self.config.action_path(ACTION_CONTROL)?;
        let body = serde_json::to_value(update)?;

        let transaction = self.state.updating_state(update);
        let response = self
            .dispatch(Method::POST, &path, RequestOptions::new().json(body))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::Configuration(
                "It seems that testsuite support is not enabled for your service".into(),
            ));
        }
        let data = response.error_for_status()?.json_value()?;

        transaction.commit();
        Ok(data)
    }

    // ========================================================================
    // Testsuite actions
    // ========================================================================

    async fn do_testsuite_action(&self, action: &str, body: Value) -> Result<Response> {
        let path = self.config.action_path(action)?;
        self.request(Method::POST, &path, RequestOptions::new().json(body))
            .await
    }

    async fn testsuite_action(&self, action: &str, body: Value) -> Result<Value> {
        let response = self.do_testsuite_action(action, body).await?;
        if response.status() == StatusCode::INTERNAL_SERVER_ERROR {
            return Err(Error::ActionFailed {
                action: action.to_string(),
            });
        }
        let response = response.error_for_status()?;
        if response.bytes().is_empty() {
            return Ok(Value::Null);
        }
        response.json_value()
    }

    fn deferred_action(&self, action: &str, body: Value) -> Result<DeferredAction> {
        let path = self.config.action_path(action)?;
        Ok(DeferredAction::new(self.http.clone(), self.url(&path), body))
    }

    /// Run a periodic task once, synchronously.
    pub async fn run_periodic_task(&self, name: &str) -> Result<()> {
        let data = self
            .testsuite_action(ACTION_RUN_PERIODIC_TASK, json!({ "name": name }))
            .await?;
        match data.get("status").and_then(Value::as_bool) {
            Some(true) => Ok(()),
            Some(false) => Err(Error::PeriodicTaskFailed {
                name: name.to_string(),
            }),
            None => Err(Error::UnexpectedResponse(format!(
                "run_periodic_task {}: missing status in {}",
                name, data
            ))),
        }
    }

    pub async fn suspend_periodic_tasks<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tasks = self.periodic_tasks()?;
        lock(tasks, "periodic tasks").suspend(names);
        self.sync_periodic_tasks(tasks).await
    }

    pub async fn resume_periodic_tasks<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tasks = self.periodic_tasks()?;
        lock(tasks, "periodic tasks").resume(names);
        self.sync_periodic_tasks(tasks).await
    }

    pub async fn resume_all_periodic_tasks(&self) -> Result<()> {
        let tasks = self.periodic_tasks()?;
        lock(tasks, "periodic tasks").resume_all();
        self.sync_periodic_tasks(tasks).await
    }

    fn periodic_tasks(&self) -> Result<&SharedPeriodicTasks> {
        self.periodic_tasks
            .as_ref()
            .ok_or_else(|| Error::Configuration("No periodic_tasks_state given".into()))
    }

    async fn sync_periodic_tasks(&self, tasks: &SharedPeriodicTasks) -> Result<()> {
        let pending = lock(tasks, "periodic tasks").pending_suspension();
        let Some(names) = pending else {
            return Ok(());
        };

        debug!("Suspending periodic tasks: {:?}", names);
        self.testsuite_action(ACTION_SUSPEND_PERIODIC_TASKS, json!({ "names": names }))
            .await?;
        lock(tasks, "periodic tasks").mark_synced(&names);
        Ok(())
    }

    pub async fn write_cache_dumps<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = owned_names(names);
        self.testsuite_action(ACTION_WRITE_CACHE_DUMPS, json!({ "names": names }))
            .await?;
        Ok(())
    }

    pub async fn read_cache_dumps<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = owned_names(names);
        self.testsuite_action(ACTION_READ_CACHE_DUMPS, json!({ "names": names }))
            .await?;
        Ok(())
    }

    /// Reset every metric that supports resetting.
    pub async fn reset_metrics(&self) -> Result<()> {
        self.testsuite_action(ACTION_RESET_METRICS, json!({})).await?;
        Ok(())
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Names of the testsuite tasks registered in the service.
    pub async fn list_tasks(&self) -> Result<Vec<String>> {
        let response = self
            .do_testsuite_action(ACTION_TASKS_LIST, json!({}))
            .await?
            .error_for_status()?;
        let data: TaskResponse = response.json()?;
        data.tasks
            .ok_or_else(|| Error::UnexpectedResponse("tasks_list response without tasks".into()))
    }

    /// Run task `name` and wait for it to finish.
    pub async fn run_task(&self, name: &str) -> Result<()> {
        let body = serde_json::to_value(TaskNameRequest { name })?;
        let response = self.do_testsuite_action(ACTION_TASK_RUN, body).await?;
        check_task_response(name, &response)?;
        Ok(())
    }

    pub async fn run_distlock_task(&self, name: &str) -> Result<()> {
        self.run_task(&format!("distlock/{}", name)).await
    }

    /// Spawn task `name`, run `scope`, then stop the task.
    ///
    /// The stop request is sent on every exit path, including cancellation
    /// of the returned future while the stop itself is in flight.
    pub async fn spawn_task<F, Fut, T>(&self, name: &str, scope: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let task_id = self.task_spawn(name).await?;
        let guard = self.deferred_action(ACTION_TASK_STOP, json!({ "task_id": task_id }))?;

        let result = scope().await;

        let stopped = self.task_stop(&task_id).await;
        guard.disarm();
        finish_scope(result, stopped, "task stop")
    }

    async fn task_spawn(&self, name: &str) -> Result<String> {
        let body = serde_json::to_value(TaskNameRequest { name })?;
        let response = self.do_testsuite_action(ACTION_TASK_SPAWN, body).await?;
        let data = check_task_response(name, &response)?;
        let task_id = data.task_id.ok_or_else(|| {
            Error::UnexpectedResponse(format!("task_spawn {} response without task_id", name))
        })?;
        debug!("Spawned task {} as {}", name, task_id);
        Ok(task_id)
    }

    async fn task_stop(&self, task_id: &str) -> Result<()> {
        let body = serde_json::to_value(TaskStopRequest { task_id })?;
        let response = self.do_testsuite_action(ACTION_TASK_STOP, body).await?;
        check_task_response(task_id, &response)?;
        Ok(())
    }

    // ========================================================================
    // Log capture
    // ========================================================================

    /// Capture service logs while `scope` runs.
    ///
    /// The service is told to duplicate its logs before `scope` starts and to
    /// stop afterwards, on every exit path including cancellation.
    pub async fn capture_logs<F, Fut, T>(&self, scope: F) -> Result<T>
    where
        F: FnOnce(LogCapture) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let fixture = self
            .log_capture
            .clone()
            .ok_or_else(|| Error::Configuration("No log capture fixture given".into()))?;
        let guard = self.deferred_action(
            ACTION_LOG_CAPTURE,
            json!({ "socket_logging_duplication": false }),
        )?;

        let capture = match fixture.start_capture().await {
            Ok(capture) => capture,
            Err(e) => {
                guard.disarm();
                return Err(e);
            }
        };
        let capture_guard = DeferredCaptureStop::new(Arc::clone(&fixture), capture.clone());

        if let Err(e) = self.set_log_duplication(true).await {
            guard.disarm();
            fixture.stop_capture(&capture).await;
            capture_guard.disarm();
            return Err(e);
        }

        let result = scope(capture.clone()).await;

        let disabled = self.set_log_duplication(false).await;
        guard.disarm();
        fixture.stop_capture(&capture).await;
        capture_guard.disarm();
        finish_scope(result, disabled, "log capture")
    }

    async fn set_log_duplication(&self, enabled: bool) -> Result<()> {
        self.testsuite_action(
            ACTION_LOG_CAPTURE,
            json!({ "socket_logging_duplication": enabled }),
        )
        .await?;
        Ok(())
    }
}

fn owned_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Into::into).collect()
}
