use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credential exchange request (`POST auth`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

/// Credential exchange response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub username: String,
    pub token: String,
}

/// Pending documents waiting for review (`GET inbox`).
///
/// `count` is the full inbox size; `docs` may be truncated by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxResponse {
    pub count: u64,
    pub docs: Vec<String>,
}

/// Metadata of a single document bundle (`GET bundles/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleResponse {
    pub id: String,
    #[serde(default)]
    pub uploaded: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Marks a reviewed inbox document as archived (`PUT bundles/{id}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRequest {
    pub reviewed: DateTime<Utc>,
    pub tags: Vec<String>,
    pub properties: BTreeMap<String, String>,
}

/// Search response (`POST search`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Hits,
    #[serde(default)]
    pub aggregations: Aggregations,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_id")]
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregations {
    #[serde(default)]
    pub tags: TermsAggregation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsAggregation {
    #[serde(default)]
    pub buckets: Vec<TagBucket>,
}

/// Number of documents in the current result set carrying `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagBucket {
    pub key: String,
    pub doc_count: u64,
}

/// Identifier the server assigns to a freshly uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: String,
}

/// Error payload returned by the server on non-2xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
