//! Client of the service's monitor listener (metrics).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::debug;

use crate::config::{join_url, ClientConfig};
use crate::error::{Error, Result};
use crate::response::Response;

/// One metric record: labels plus value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub value: Number,
}

impl Metric {
    pub fn new(labels: BTreeMap<String, String>, value: impl Into<Number>) -> Self {
        Self {
            labels,
            value: value.into(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.value.as_i64()
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_f64()
    }
}

/// Filters of a metrics query; all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsQuery {
    /// Full metric path.
    pub path: Option<String>,
    /// Prefix the metric paths must start with.
    pub prefix: Option<String>,
    /// Labels the metrics must carry.
    pub labels: Option<BTreeMap<String, String>>,
}

impl MetricsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Query string parameters, always including `format=json`.
    fn params(&self) -> Result<Vec<(&'static str, String)>> {
        let mut params = vec![("format", "json".to_string())];
        if let Some(prefix) = self.prefix.as_ref().filter(|p| !p.is_empty()) {
            params.push(("prefix", prefix.clone()));
        }
        if let Some(path) = self.path.as_ref().filter(|p| !p.is_empty()) {
            params.push(("path", path.clone()));
        }
        if let Some(labels) = self.labels.as_ref().filter(|l| !l.is_empty()) {
            params.push(("labels", serde_json::to_string(labels)?));
        }
        Ok(params)
    }
}

/// Client of the monitor listener.
///
/// Unlike [`ServiceClient`](crate::ServiceClient) it never touches
/// server-side test state.
pub struct MonitorClient {
    base_url: String,
    http: reqwest::Client,
    config: ClientConfig,
}

impl MonitorClient {
    pub fn new(base_url: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_http_client(base_url, config, http))
    }

    pub fn with_http_client(
        base_url: impl Into<String>,
        config: ClientConfig,
        http: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            config,
        }
    }

    async fn fetch(&self, params: &[(&str, String)]) -> Result<Response> {
        let path = self.config.monitor_path()?;
        let url = join_url(&self.base_url, path);
        debug!("GET {} {:?}", path, params);

        let mut request = self.http.get(&url);
        if !params.is_empty() {
            request = request.query(params);
        }
        let response = Response::from_reqwest(request.send().await?).await?;
        response.error_for_status()
    }

    /// Metrics keyed by path.
    pub async fn metrics(&self, query: MetricsQuery) -> Result<BTreeMap<String, Vec<Metric>>> {
        self.config.monitor_path()?;
        let params = query.params()?;
        let response = self.fetch(&params).await?;
        response.json()
    }

    /// The single metric at `path` matching `labels`, or `None`.
    ///
    /// More than one match is an [`Error::AmbiguousMetric`].
    pub async fn single_metric(
        &self,
        path: &str,
        labels: Option<BTreeMap<String, String>>,
    ) -> Result<Option<Metric>> {
        let query = MetricsQuery {
            path: Some(path.to_string()),
            prefix: None,
            labels,
        };
        let mut metrics = self.metrics(query).await?;
        let mut records = metrics.remove(path).unwrap_or_default();

        if records.len() > 1 {
            return Err(Error::AmbiguousMetric {
                path: path.to_string(),
                count: records.len(),
            });
        }
        Ok(records.pop())
    }

    /// Raw monitor JSON, optionally filtered by `prefix`.
    #[deprecated(note = "use metrics() or single_metric() instead")]
    pub async fn get_metrics(&self, prefix: Option<&str>) -> Result<Value> {
        let params: Vec<(&str, String)> = prefix
            .map(|prefix| vec![("prefix", prefix.to_string())])
            .unwrap_or_default();
        let response = self.fetch(&params).await?;
        response.json_value()
    }

    /// Raw monitor JSON of a single metric.
    #[deprecated(note = "use metrics() or single_metric() instead")]
    #[allow(deprecated)]
    pub async fn get_metric(&self, name: &str) -> Result<Value> {
        let mut metrics = self.get_metrics(Some(name)).await?;
        metrics
            .get_mut(name)
            .map(Value::take)
            .ok_or_else(|| Error::MetricNotFound {
                name: name.to_string(),
            })
    }
}
