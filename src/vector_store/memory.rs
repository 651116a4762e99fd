//! In-memory [`VectorStore`] for tests and offline runs.
//!
//! Records live in nested maps keyed by index, then namespace, then id.
//! Queries are brute-force cosine similarity over the namespace.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{IndexSpec, QueryMatch, QueryRequest, VectorRecord, VectorStore};
use crate::embeddings::cosine_similarity;
use crate::types::{AppError, AppResult};

type Namespaces = HashMap<String, HashMap<String, VectorRecord>>;

#[derive(Default)]
pub struct InMemoryVectorStore {
    indexes: RwLock<HashMap<String, Namespaces>>,
    specs: RwLock<HashMap<String, IndexSpec>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in one namespace of an index.
    pub async fn count(&self, index: &str, namespace: &str) -> usize {
        let indexes = self.indexes.read().await;
        indexes
            .get(index)
            .and_then(|ns| ns.get(namespace))
            .map(|records| records.len())
            .unwrap_or(0)
    }

    async fn check_dimension(&self, index: &str, records: &[VectorRecord]) -> AppResult<()> {
        let specs = self.specs.read().await;
        if let Some(spec) = specs.get(index) {
            if let Some(bad) = records.iter().find(|r| r.values.len() != spec.dimension) {
                return Err(AppError::VectorStore(format!(
                    "Vector dimension {} does not match index '{}' dimension {} (id {})",
                    bad.values.len(),
                    index,
                    spec.dimension,
                    bad.id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_index(&self, spec: &IndexSpec) -> AppResult<()> {
        let mut specs = self.specs.write().await;
        specs.entry(spec.name.clone()).or_insert_with(|| spec.clone());
        Ok(())
    }

    async fn upsert(&self, index: &str, namespace: &str, records: Vec<VectorRecord>) -> AppResult<usize> {
        self.check_dimension(index, &records).await?;

        let mut indexes = self.indexes.write().await;
        let target = indexes
            .entry(index.to_string())
            .or_default()
            .entry(namespace.to_string())
            .or_default();
        let count = records.len();
        for record in records {
            target.insert(record.id.clone(), record);
        }
        Ok(count)
    }

    async fn fetch(&self, index: &str, namespace: &str, ids: &[String]) -> AppResult<HashMap<String, VectorRecord>> {
        let indexes = self.indexes.read().await;
        let Some(records) = indexes.get(index).and_then(|ns| ns.get(namespace)) else {
            return Ok(HashMap::new());
        };

        Ok(ids
            .iter()
            .filter_map(|id| records.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }

    async fn query(&self, index: &str, request: QueryRequest) -> AppResult<Vec<QueryMatch>> {
        let indexes = self.indexes.read().await;
        let Some(records) = indexes.get(index).and_then(|ns| ns.get(&request.namespace)) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<QueryMatch> = records
            .values()
            .filter(|r| request.filter.as_ref().map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| QueryMatch {
                id: r.id.clone(),
                score: cosine_similarity(&request.vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(request.top_k);
        Ok(matches)
    }
}
