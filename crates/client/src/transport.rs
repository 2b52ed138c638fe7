//! The HTTP capability the rest of the crate is written against.
//!
//! `Transport` makes exactly one attempt per request. Retries, credentials and
//! error normalisation live above it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::error::ClientError;

/// Response header names, lower-cased.
pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the transport's base URL, e.g. `bundles/d1`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: vec![],
            headers: vec![],
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Serializes `body` as JSON and sets the content type.
    pub fn with_json<B: serde::Serialize>(mut self, body: &B) -> Result<Self, ClientError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ClientError::Processing(format!("encode request body: {e}")))?;
        self.body = Some(bytes);
        Ok(self.with_header("content-type", "application/json"))
    }

    /// Sends `bytes` as is under the given media type.
    pub fn with_body(mut self, bytes: Vec<u8>, content_type: &str) -> Self {
        self.body = Some(bytes);
        self.with_header("content-type", content_type)
    }

    /// Case-insensitive lookup of a request header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A 2xx response.
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ClientError::Processing(format!("decode response body: {e}")))
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransportFailure {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("{status} {status_text}")]
    Status {
        status: u16,
        status_text: String,
        headers: Headers,
        body: Vec<u8>,
    },
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportFailure>;
}

/// `Transport` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> anyhow::Result<Self> {
        // A trailing slash makes `Url::join` append instead of replacing the last segment.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| anyhow::anyhow!("invalid base url '{base_url}': {e}"))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, TransportFailure> {
        let mut url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| TransportFailure::Connection(format!("invalid path '{}': {e}", request.path)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportFailure> {
        let url = self.url_for(&request)?;
        debug!("{} {}", request.method, url);

        let mut builder = self.client.request(request.method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| TransportFailure::Connection(e.to_string()))?;

        let status = resp.status();
        let headers: Headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportFailure::Connection(format!("read body: {e}")))?
            .to_vec();

        if status.is_success() {
            Ok(ApiResponse {
                status: status.as_u16(),
                headers,
                body,
            })
        } else {
            Err(TransportFailure::Status {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                headers,
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_url_and_path() {
        let transport = HttpTransport::new("http://localhost:8000/api").unwrap();
        let request = ApiRequest::new(Method::GET, "/bundles/d1")
            .with_query(vec![("q".into(), "a b".into())]);
        let url = transport.url_for(&request).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/bundles/d1?q=a+b");
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(HttpTransport::new("not a url").is_err());
    }

    #[test]
    fn response_header_lookup_ignores_case() {
        let mut resp = ApiResponse::default();
        resp.headers.insert("authorization".into(), "tok".into());
        assert_eq!(resp.header("Authorization"), Some("tok"));
    }
}
