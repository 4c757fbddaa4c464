//! Bounded-timeout transport adapter
//!
//! [`Transport`] is the raw seam (HTTP in production, in-process loopback in
//! tests). [`TransportAdapter`] wraps it so that no remote call can stall past
//! its bound: the send runs as its own task, and when the bound elapses the
//! task is abandoned rather than cancelled. A late result is discarded.

use crate::error::TransportError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// HTTP method subset used by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

impl Method {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Method
    pub method: Method,
    /// Path relative to the service root (e.g. `api/offices`)
    pub path: String,
    /// Query pairs
    pub query: Vec<(String, String)>,
    /// Extra headers
    pub headers: Vec<(String, String)>,
    /// JSON body
    pub body: Option<serde_json::Value>,
}

impl Request {
    /// GET request
    #[inline]
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// POST request
    #[inline]
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Add a query pair
    #[inline]
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header
    #[inline]
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a JSON body
    ///
    /// # Errors
    /// `TransportError::Validation` if `body` cannot be serialized
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, TransportError> {
        let value =
            serde_json::to_value(body).map_err(|e| TransportError::Validation(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Header value by case-insensitive name
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Query value by name
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// `METHOD path` label for logs and errors
    #[must_use]
    pub fn target(&self) -> String {
        format!("{} {}", self.method.as_str(), self.path)
    }
}

/// Incoming response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: u16,
    /// Body bytes
    pub body: Vec<u8>,
}

impl Response {
    /// Response with a JSON body
    ///
    /// # Errors
    /// `TransportError::Decode` if `body` cannot be serialized
    pub fn json<T: Serialize + ?Sized>(status: u16, body: &T) -> Result<Self, TransportError> {
        let body = serde_json::to_vec(body).map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(Self { status, body })
    }

    /// Whether the status is 2xx
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the JSON body
    ///
    /// # Errors
    /// `TransportError::Decode` if the body does not match `T`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body).map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// Body as lossy UTF-8
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Raw request sender
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one request; non-2xx statuses are returned as responses
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

/// Bounded request wrapper used by every remote call
#[derive(Clone)]
pub struct TransportAdapter {
    inner: Arc<dyn Transport>,
}

impl std::fmt::Debug for TransportAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportAdapter").finish_non_exhaustive()
    }
}

impl TransportAdapter {
    /// Wrap a transport
    #[inline]
    #[must_use]
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self { inner }
    }

    /// Send `request`, failing with `Timeout` if nothing arrives within
    /// `timeout`
    ///
    /// Non-2xx responses become `TransportError::Http`.
    ///
    /// # Errors
    /// Any [`TransportError`]
    pub async fn request(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let target = request.target();
        let inner = Arc::clone(&self.inner);

        // Dropping the handle detaches the task; it is never aborted.
        let in_flight = tokio::spawn(async move { inner.send(request).await });

        let response = match tokio::time::timeout(timeout, in_flight).await {
            Err(_) => {
                tracing::debug!(%target, "request abandoned after {}ms", timeout.as_millis());
                return Err(TransportError::Timeout {
                    target,
                    after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            Ok(Err(join_error)) => {
                return Err(TransportError::Network(format!(
                    "transport task failed: {join_error}"
                )));
            }
            Ok(Ok(result)) => result?,
        };

        if response.is_success() {
            Ok(response)
        } else {
            tracing::debug!(%target, status = response.status, "request rejected");
            Err(TransportError::Http {
                status: response.status,
                message: response.text(),
            })
        }
    }
}
