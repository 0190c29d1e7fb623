//! Per-request options for generic service calls.

use bytes::Bytes;
use serde_json::Value;

/// Options of a single service request.
///
/// ```
/// use testsuite_client::RequestOptions;
/// use serde_json::json;
///
/// let options = RequestOptions::new()
///     .json(json!({"id": 42}))
///     .query("verbose", "1")
///     .bearer("token")
///     .x_real_ip("10.0.0.1");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub(crate) json: Option<Value>,
    pub(crate) body: Option<Bytes>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) bearer: Option<String>,
    pub(crate) x_real_ip: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON body; takes precedence over [`body`](Self::body).
    pub fn json(mut self, value: Value) -> Self {
        self.json = Some(value);
        self
    }

    /// Raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// `Authorization: Bearer <token>`.
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// `X-Real-IP` header.
    pub fn x_real_ip(mut self, ip: impl Into<String>) -> Self {
        self.x_real_ip = Some(ip.into());
        self
    }
}
