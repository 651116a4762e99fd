//! Pinecone REST client
//!
//! Control-plane calls (list/describe/create index) go to
//! `https://api.pinecone.io`; data-plane calls (upsert, fetch, query) go to the
//! per-index host returned by describe, which is cached after first use.
//!
//! API Reference: https://docs.pinecone.io/reference/api/introduction

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{IndexSpec, QueryMatch, QueryRequest, VectorRecord, VectorStore};
use crate::config::PineconeConfig;
use crate::types::{AppError, AppResult};

const DEFAULT_API_VERSION: &str = "2024-07";
// Serverless indexes usually become ready within a few seconds
const READY_POLL_ATTEMPTS: u32 = 30;

/// Pinecone client implementing [`VectorStore`]
///
/// Index hosts are resolved through describe-index and cached per index name.
pub struct PineconeClient {
    client: Client,
    api_key: String,
    control_plane_url: String,
    api_version: String,
    hosts: RwLock<HashMap<String, String>>,
}

#[derive(Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexModel>,
}

#[derive(Deserialize)]
struct IndexModel {
    name: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: CreateIndexSpec<'a>,
}

#[derive(Serialize)]
struct CreateIndexSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    namespace: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, VectorRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

impl PineconeClient {
    /// Client using the configured control plane and API version
    pub fn from_config(api_key: &str, config: &PineconeConfig) -> Self {
        let mut client = Self::with_control_plane(api_key, &config.control_plane_url);
        client.api_version = config.api_version.clone();
        client
    }

    /// Point the client at a different control plane (local emulators, tests)
    pub fn with_control_plane(api_key: &str, control_plane_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            control_plane_url: control_plane_url.trim_end_matches('/').to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            hosts: RwLock::new(HashMap::new()),
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", &self.api_version)
            .header("Accept", "application/json")
    }

    async fn check(response: Response, operation: &str) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::VectorStore(format!(
            "Pinecone {} failed ({}): {}",
            operation, status, body
        )))
    }

    async fn list_indexes(&self) -> AppResult<Vec<IndexModel>> {
        let url = format!("{}/indexes", self.control_plane_url);
        let response = self.request(Method::GET, &url).send().await?;
        let list: IndexList = Self::check(response, "list indexes").await?.json().await?;
        Ok(list.indexes)
    }

    async fn describe_index(&self, index: &str) -> AppResult<IndexModel> {
        let url = format!("{}/indexes/{}", self.control_plane_url, index);
        let response = self.request(Method::GET, &url).send().await?;
        Ok(Self::check(response, "describe index").await?.json().await?)
    }

    async fn remember_host(&self, index: &str, host: &str) {
        let mut hosts = self.hosts.write().await;
        hosts.insert(index.to_string(), data_plane_url(host));
    }

    async fn index_host(&self, index: &str) -> AppResult<String> {
        if let Some(host) = self.hosts.read().await.get(index) {
            return Ok(host.clone());
        }

        let model = self.describe_index(index).await?;
        if model.host.is_empty() {
            return Err(AppError::VectorStore(format!("Index '{}' has no host yet", index)));
        }
        self.remember_host(index, &model.host).await;
        Ok(data_plane_url(&model.host))
    }

    async fn wait_until_ready(&self, index: &str) -> AppResult<()> {
        for attempt in 0..READY_POLL_ATTEMPTS {
            let model = self.describe_index(index).await?;
            let ready = model.status.as_ref().map_or(true, |s| s.ready);
            if ready && !model.host.is_empty() {
                self.remember_host(index, &model.host).await;
                return Ok(());
            }
            debug!(index, attempt, "Waiting for index to become ready");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Err(AppError::Timeout(format!("Index '{}' did not become ready", index)))
    }
}

/// Index hosts come back without a scheme
fn data_plane_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

#[async_trait]
impl VectorStore for PineconeClient {
    async fn ensure_index(&self, spec: &IndexSpec) -> AppResult<()> {
        let existing = self.list_indexes().await?;
        if let Some(model) = existing.iter().find(|m| m.name == spec.name) {
            if !model.host.is_empty() {
                self.remember_host(&spec.name, &model.host).await;
            }
            return Ok(());
        }

        info!(index = %spec.name, dimension = spec.dimension, "Creating Pinecone index");
        let url = format!("{}/indexes", self.control_plane_url);
        let body = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: &spec.metric,
            spec: CreateIndexSpec {
                serverless: ServerlessSpec {
                    cloud: &spec.cloud,
                    region: &spec.region,
                },
            },
        };
        let response = self.request(Method::POST, &url).json(&body).send().await?;
        let created: IndexModel = Self::check(response, "create index").await?.json().await?;

        let ready = created.status.as_ref().map_or(false, |s| s.ready);
        if ready && !created.host.is_empty() {
            self.remember_host(&spec.name, &created.host).await;
            Ok(())
        } else {
            warn!(index = %spec.name, "Index created but not ready yet");
            self.wait_until_ready(&spec.name).await
        }
    }

    async fn upsert(&self, index: &str, namespace: &str, records: Vec<VectorRecord>) -> AppResult<usize> {
        let host = self.index_host(index).await?;
        let url = format!("{}/vectors/upsert", host);
        let body = UpsertRequest {
            vectors: &records,
            namespace,
        };

        let response = self.request(Method::POST, &url).json(&body).send().await?;
        let result: UpsertResponse = Self::check(response, "upsert").await?.json().await?;
        debug!(index, namespace, count = result.upserted_count, "Upserted vectors");
        Ok(result.upserted_count)
    }

    async fn fetch(&self, index: &str, namespace: &str, ids: &[String]) -> AppResult<HashMap<String, VectorRecord>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let host = self.index_host(index).await?;
        let url = format!("{}/vectors/fetch", host);

        let mut params: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        params.push(("namespace", namespace));

        let response = self.request(Method::GET, &url).query(&params).send().await?;
        let result: FetchResponse = Self::check(response, "fetch").await?.json().await?;
        Ok(result.vectors)
    }

    async fn query(&self, index: &str, request: QueryRequest) -> AppResult<Vec<QueryMatch>> {
        let host = self.index_host(index).await?;
        let url = format!("{}/query", host);
        let body = QueryBody {
            namespace: &request.namespace,
            vector: &request.vector,
            top_k: request.top_k,
            include_metadata: true,
            include_values: false,
            filter: request.filter.as_ref().map(|f| f.to_json()),
        };

        let response = self.request(Method::POST, &url).json(&body).send().await?;
        let result: QueryResponse = Self::check(response, "query").await?.json().await?;
        Ok(result.matches)
    }
}
