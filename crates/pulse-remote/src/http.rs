//! Production transport over HTTP (reqwest)

use crate::error::TransportError;
use crate::transport::{Method, Request, Response, Transport};
use async_trait::async_trait;

/// [`Transport`] backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Transport against `base_url` (e.g. `http://127.0.0.1:8080`)
    ///
    /// # Errors
    /// `TransportError::Validation` if the base URL is not http(s)
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(TransportError::Validation(format!(
                "base url must be http(s): {base_url}"
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL for a service path
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Response {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_base() {
        assert!(HttpTransport::new("ftp://example.org").is_err());
    }

    #[test]
    fn joins_paths() {
        let transport = HttpTransport::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(transport.url("/api/offices"), "http://127.0.0.1:8080/api/offices");
        assert_eq!(transport.url("api/pulse"), "http://127.0.0.1:8080/api/pulse");
    }
}
