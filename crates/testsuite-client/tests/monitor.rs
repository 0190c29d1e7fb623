//! Metrics through the monitor listener.

mod common;

use std::collections::BTreeMap;

use common::{MockService, MONITOR_PATH};
use serde_json::json;
use testsuite_client::{Error, MetricsQuery, MonitorClient};

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_metrics_query_parameters() {
    let service = MockService::start().await;
    service.respond(
        MONITOR_PATH,
        200,
        json!({"cache.hits": [{"labels": {"cache_name": "users"}, "value": 7}]}),
    );
    let monitor = service.monitor_client();

    let metrics = monitor
        .metrics(MetricsQuery::new().path("cache.hits").label("cache_name", "users"))
        .await
        .unwrap();
    assert_eq!(metrics["cache.hits"][0].as_i64(), Some(7));

    let request = &service.requests_to(MONITOR_PATH)[0];
    assert_eq!(request.method, "GET");
    assert_eq!(request.query["format"], "json");
    assert_eq!(request.query["path"], "cache.hits");
    assert_eq!(request.query["labels"], r#"{"cache_name":"users"}"#);
    assert!(!request.query.contains_key("prefix"));
}

#[tokio::test]
async fn test_monitor_does_not_sync_state() {
    let service = MockService::start().await;
    let monitor = service.monitor_client();

    monitor.metrics(MetricsQuery::new()).await.unwrap();

    assert_eq!(service.paths(), vec![MONITOR_PATH]);
}

#[tokio::test]
async fn test_single_metric() {
    let service = MockService::start().await;
    let monitor = service.monitor_client();

    service.respond_once(
        MONITOR_PATH,
        200,
        json!({"cache.hits": [{"labels": {"cache_name": "users"}, "value": 3}]}),
    );
    let metric = monitor
        .single_metric("cache.hits", Some(labels(&[("cache_name", "users")])))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metric.labels, labels(&[("cache_name", "users")]));
    assert_eq!(metric.as_i64(), Some(3));

    service.respond_once(MONITOR_PATH, 200, json!({}));
    let metric = monitor.single_metric("cache.hits", None).await.unwrap();
    assert!(metric.is_none());
}

#[tokio::test]
async fn test_single_metric_rejects_multiple_records() {
    let service = MockService::start().await;
    service.respond(
        MONITOR_PATH,
        200,
        json!({"cache.hits": [
            {"labels": {"cache_name": "users"}, "value": 1},
            {"labels": {"cache_name": "orders"}, "value": 2},
        ]}),
    );
    let monitor = service.monitor_client();

    let err = monitor.single_metric("cache.hits", None).await.unwrap_err();
    assert!(matches!(err, Error::AmbiguousMetric { count: 2, .. }));
}

#[tokio::test]
async fn test_monitor_http_error() {
    let service = MockService::start().await;
    service.respond(MONITOR_PATH, 503, json!({}));
    let monitor = service.monitor_client();

    let err = monitor.metrics(MetricsQuery::new()).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
#[allow(deprecated)]
async fn test_deprecated_raw_lookup() {
    let service = MockService::start().await;
    service.respond(
        MONITOR_PATH,
        200,
        json!({"sample": {"counter": 5}}),
    );
    let monitor = service.monitor_client();

    let value = monitor.get_metric("sample").await.unwrap();
    assert_eq!(value, json!({"counter": 5}));
    assert_eq!(service.requests_to(MONITOR_PATH)[0].query["prefix"], "sample");

    let err = monitor.get_metric("absent").await.unwrap_err();
    assert!(matches!(err, Error::MetricNotFound { ref name } if name == "absent"));
}

#[tokio::test]
async fn test_relative_monitor_path() {
    let service = MockService::start().await;
    let config = service.config().with_server_monitor_path("service/monitor");
    let monitor = MonitorClient::new(service.base_url(), config).unwrap();

    monitor.metrics(MetricsQuery::new()).await.unwrap();

    assert_eq!(service.paths(), vec![MONITOR_PATH]);
}
