//! Uniform response wrapper over `reqwest::Response`.

use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Fully-read HTTP response.
///
/// The body is buffered on construction so the wrapper can be inspected
/// several times and outlives the connection.
#[derive(Debug, Clone)]
pub struct Response {
    url: String,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Read the whole body of a transport response.
    pub async fn from_reqwest(response: reqwest::Response) -> Result<Self> {
        let url = response.url().to_string();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Self {
            url,
            status,
            headers,
            body,
        })
    }

    /// Build a response from parts.
    pub fn new(url: impl Into<String>, status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Media type without parameters, e.g. `application/json`.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim())
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Body decoded as UTF-8 (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON regardless of the declared content type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body parsed as an untyped JSON value.
    pub fn json_value(&self) -> Result<serde_json::Value> {
        self.json()
    }

    /// Turn a non-2xx status into [`Error::Http`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(self.http_error())
        }
    }

    pub(crate) fn http_error(&self) -> Error {
        Error::Http {
            url: self.url.clone(),
            status: self.status.as_u16(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_json_accessors() {
        let response = Response::new("http://svc/ping", StatusCode::OK, r#"{"status":true}"#);
        let value = response.json_value().unwrap();
        assert_eq!(value["status"], serde_json::Value::Bool(true));
        assert_eq!(response.text(), r#"{"status":true}"#);
    }

    #[test]
    fn test_error_for_status() {
        let ok = Response::new("http://svc/ping", StatusCode::NO_CONTENT, "");
        assert!(ok.error_for_status().is_ok());

        let bad = Response::new("http://svc/ping", StatusCode::BAD_GATEWAY, "oops");
        match bad.error_for_status() {
            Err(Error::Http { url, status }) => {
                assert_eq!(url, "http://svc/ping");
                assert_eq!(status, 502);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_content_type_strips_parameters() {
        let mut response = Response::new("http://svc/ping", StatusCode::OK, "{}");
        response.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(
            response.header("content-type"),
            Some("application/json; charset=utf-8")
        );
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let response = Response::new("http://svc/ping", StatusCode::OK, "not json");
        assert!(matches!(response.json_value(), Err(Error::Json(_))));
    }
}
