//! Typed access to the document server's REST resources.

use std::sync::Arc;

use adacta_core::api::{
    ArchiveRequest, BundleResponse, InboxResponse, SearchResponse, UploadResponse,
};
use adacta_core::query::SearchQuery;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::RequestAuthenticator;
use crate::error::ClientError;
use crate::session::SessionStore;
use crate::transport::{ApiRequest, ApiResponse};

/// Media type the upload endpoint accepts.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A path under the server's base URL, composed segment by segment.
#[derive(Clone)]
pub struct Resource {
    auth: Arc<RequestAuthenticator>,
    path: String,
    query: Vec<(String, String)>,
}

impl Resource {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Appends a path segment.
    pub fn at(&self, segment: impl AsRef<str>) -> Self {
        let segment = segment.as_ref().trim_matches('/');
        let path = if self.path.is_empty() {
            segment.to_string()
        } else {
            format!("{}/{segment}", self.path.trim_end_matches('/'))
        };
        Self {
            auth: Arc::clone(&self.auth),
            path,
            query: self.query.clone(),
        }
    }

    /// Adds query parameters.
    pub fn using<K, V>(&self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut next = self.clone();
        next.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        next
    }

    pub async fn get(&self) -> Result<ApiResponse, ClientError> {
        self.send(self.request(Method::GET)).await
    }

    pub async fn delete(&self) -> Result<ApiResponse, ClientError> {
        self.send(self.request(Method::DELETE)).await
    }

    pub async fn put<B: Serialize>(&self, body: &B) -> Result<ApiResponse, ClientError> {
        self.send(self.request(Method::PUT).with_json(body)?).await
    }

    pub async fn post<B: Serialize>(&self, body: &B) -> Result<ApiResponse, ClientError> {
        self.send(self.request(Method::POST).with_json(body)?).await
    }

    pub async fn post_bytes(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<ApiResponse, ClientError> {
        self.send(self.request(Method::POST).with_body(bytes, content_type))
            .await
    }

    pub async fn get_json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        self.get().await?.json()
    }

    fn request(&self, method: Method) -> ApiRequest {
        ApiRequest::new(method, self.path.clone()).with_query(self.query.clone())
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        self.auth.send(request).await
    }
}

/// Entry point for the server's endpoints. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    auth: Arc<RequestAuthenticator>,
}

impl ApiClient {
    pub fn new(auth: Arc<RequestAuthenticator>) -> Self {
        Self { auth }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        self.auth.session()
    }

    pub fn resource(&self, path: impl AsRef<str>) -> Resource {
        Resource {
            auth: Arc::clone(&self.auth),
            path: String::new(),
            query: vec![],
        }
        .at(path)
    }

    pub async fn inbox(&self) -> Result<InboxResponse, ClientError> {
        self.resource("inbox").get_json().await
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ClientError> {
        self.resource("search").post(query).await?.json()
    }

    pub async fn bundle(&self, id: &str) -> Result<BundleResponse, ClientError> {
        self.resource("bundles").at(id).get_json().await
    }

    /// Adds a PDF to the inbox and returns its new id.
    pub async fn upload(&self, pdf: Vec<u8>) -> Result<UploadResponse, ClientError> {
        self.resource("upload")
            .post_bytes(pdf, PDF_CONTENT_TYPE)
            .await?
            .json()
    }

    /// Files a reviewed inbox document.
    pub async fn archive(&self, id: &str, request: &ArchiveRequest) -> Result<(), ClientError> {
        self.resource("bundles").at(id).put(request).await?;
        Ok(())
    }

    pub async fn delete_bundle(&self, id: &str) -> Result<(), ClientError> {
        self.resource("bundles").at(id).delete().await?;
        Ok(())
    }

    /// The original uploaded document.
    pub async fn document(&self, id: &str) -> Result<Vec<u8>, ClientError> {
        Ok(self.resource("repo").at(id).at("document").get().await?.body)
    }

    /// Rendered preview image.
    pub async fn preview(&self, id: &str) -> Result<Vec<u8>, ClientError> {
        Ok(self.resource("repo").at(id).at("preview").get().await?.body)
    }

    /// All known labels, sorted.
    pub async fn labels(&self) -> Result<Vec<String>, ClientError> {
        let mut labels: Vec<String> = self.resource("labels").get_json().await?;
        labels.sort();
        Ok(labels)
    }

    /// Labels the server suggests for a document, sorted.
    pub async fn guess_labels(&self, id: &str) -> Result<Vec<String>, ClientError> {
        let mut labels: Vec<String> = self
            .resource("labels")
            .at("guess")
            .at(id)
            .get_json()
            .await?;
        labels.sort();
        Ok(labels)
    }
}
