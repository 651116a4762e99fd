//! Vector Store
//!
//! A thin contract over a hosted similarity-search service: indexes hold
//! (id, vector, metadata) records partitioned into namespaces, and support
//! upsert, fetch-by-id and top-k queries with simple metadata filters.
//!
//! - [`PineconeClient`] talks to Pinecone's REST API.
//! - [`InMemoryVectorStore`] is a brute-force cosine store for tests and
//!   offline runs.

pub mod memory;
pub mod pinecone;

pub use memory::InMemoryVectorStore;
pub use pinecone::PineconeClient;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::AppResult;

/// Metadata attached to a vector; the authoritative record.
pub type Metadata = Map<String, Value>;

/// Index creation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: String,
    pub cloud: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Conjunction of equality constraints on metadata fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    equals: Vec<(String, Value)>,
}

impl MetadataFilter {
    pub fn field_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and_eq(field, value)
    }

    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals
            .iter()
            .all(|(field, value)| metadata.get(field) == Some(value))
    }

    /// Pinecone filter syntax: `{"field": {"$eq": value}, ...}`
    pub fn to_json(&self) -> Value {
        let mut filter = Map::new();
        for (field, value) in &self.equals {
            filter.insert(field.clone(), serde_json::json!({ "$eq": value }));
        }
        Value::Object(filter)
    }
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub namespace: String,
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub filter: Option<MetadataFilter>,
}

impl QueryRequest {
    pub fn new(namespace: impl Into<String>, vector: Vec<f32>, top_k: usize) -> Self {
        Self {
            namespace: namespace.into(),
            vector,
            top_k,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the index if it does not exist yet.
    async fn ensure_index(&self, spec: &IndexSpec) -> AppResult<()>;

    /// Insert or overwrite records; returns the number written.
    async fn upsert(&self, index: &str, namespace: &str, records: Vec<VectorRecord>) -> AppResult<usize>;

    /// Exact lookup; missing ids are absent from the result.
    async fn fetch(&self, index: &str, namespace: &str, ids: &[String]) -> AppResult<HashMap<String, VectorRecord>>;

    /// Top-k nearest records, best match first.
    async fn query(&self, index: &str, request: QueryRequest) -> AppResult<Vec<QueryMatch>>;
}
