//! Qdrant vector index over its HTTP API.
//!
//! Speaks the REST interface directly with `reqwest`:
//! - `GET/PUT /collections/{name}` for schema management
//! - `POST /collections/{name}/points/scroll` for snapshots
//! - `PUT /collections/{name}/points` and `POST .../points/delete` for writes
//! - `POST /collections/{name}/points/search` for retrieval

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::index::{Distance, VectorIndex};
use super::models::{
    DocumentRecord, IndexedRecord, ScoredDocument, PAYLOAD_CONTENT_HASH, PAYLOAD_SOURCE,
    PAYLOAD_TEXT,
};
use crate::error::StorageError;
use crate::{Error, Result};

/// Records requested per scroll page.
const SCROLL_PAGE_SIZE: usize = 256;

/// Qdrant connection settings.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    /// Base URL, e.g. `http://localhost:6333`.
    pub url: String,
    /// Collection name.
    pub collection: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl QdrantConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            collection: collection.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Point identifier. Qdrant accepts unsigned integers or UUID strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(String),
}

impl PointId {
    /// Recover the wire form of an id previously rendered with `Display`.
    #[must_use]
    pub fn parse(id: &str) -> Self {
        id.parse::<u64>()
            .map_or_else(|_| Self::Uuid(id.to_string()), Self::Num)
    }
}

impl std::fmt::Display for PointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Uuid(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Serialize)]
struct ScrollRequest<'a> {
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<PointId>,
    with_payload: [&'a str; 2],
    with_vector: bool,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<ScrolledPoint>,
    next_page_offset: Option<PointId>,
}

#[derive(Debug, Deserialize)]
struct ScrolledPoint {
    id: PointId,
    #[serde(default)]
    payload: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    points: [PointWrite<'a>; 1],
}

#[derive(Debug, Serialize)]
struct PointWrite<'a> {
    id: PointId,
    vector: &'a [f32],
    payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct DeleteRequest {
    points: [PointId; 1],
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: PointId,
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

fn payload_str(
    payload: Option<&serde_json::Map<String, serde_json::Value>>,
    key: &str,
) -> Option<String> {
    payload
        .and_then(|p| p.get(key))
        .and_then(serde_json::Value::as_str)
        .map(String::from)
}

/// Qdrant implementation of [`VectorIndex`].
#[derive(Debug, Clone)]
pub struct QdrantIndex {
    client: reqwest::Client,
    config: QdrantConfig,
}

impl QdrantIndex {
    /// Build a client. No request is made until first use.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build Qdrant client: {e}")))?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{suffix}",
            self.base_url(),
            self.config.collection
        )
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| StorageError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Request {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;
        Ok(envelope.result)
    }

    async fn create_collection(&self, dimension: usize, distance: Distance) -> Result<()> {
        let body = serde_json::json!({
            "vectors": { "size": dimension, "distance": distance.as_str() },
        });
        let _: serde_json::Value = self
            .send(self.client.put(self.collection_url("")).json(&body))
            .await?;

        let index_body = serde_json::json!({
            "field_name": PAYLOAD_SOURCE,
            "field_schema": "keyword",
        });
        let _: serde_json::Value = self
            .send(
                self.client
                    .put(self.collection_url("/index?wait=true"))
                    .json(&index_body),
            )
            .await?;

        tracing::info!(
            collection = %self.config.collection,
            dimension,
            %distance,
            "Created Qdrant collection"
        );
        Ok(())
    }
}

/// Check an existing collection's vector parameters.
fn check_layout(info: &serde_json::Value, dimension: usize, distance: Distance) -> Result<()> {
    let vectors = info
        .pointer("/config/params/vectors")
        .ok_or_else(|| StorageError::InvalidResponse("collection info lacks vectors".into()))?;

    let size = vectors
        .get("size")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| {
            StorageError::Schema("collection uses named vectors; expected a single vector".into())
        })?;
    let existing_distance = vectors
        .get("distance")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();

    if usize::try_from(size).ok() != Some(dimension) || existing_distance != distance.as_str() {
        return Err(StorageError::Schema(format!(
            "collection has {size} dims / {existing_distance}, expected {dimension} dims / {distance}"
        ))
        .into());
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    async fn ensure_schema(&self, dimension: usize, distance: Distance) -> Result<()> {
        let response = self
            .client
            .get(self.collection_url(""))
            .send()
            .await
            .map_err(|e| StorageError::from_transport(&e))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                tracing::info!(collection = %self.config.collection, "Collection not found, creating");
                self.create_collection(dimension, distance).await
            }
            status if status.is_success() => {
                let envelope: Envelope<serde_json::Value> = response
                    .json()
                    .await
                    .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;
                check_layout(&envelope.result, dimension, distance)?;
                tracing::debug!(collection = %self.config.collection, "Collection already exists");
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StorageError::Request {
                    status: status.as_u16(),
                    body,
                }
                .into())
            }
        }
    }

    async fn list_all(&self, limit: usize) -> Result<Vec<IndexedRecord>> {
        let mut records = Vec::new();
        let mut offset = None;

        loop {
            let remaining = limit.saturating_sub(records.len());
            if remaining == 0 {
                break;
            }

            let request = ScrollRequest {
                limit: remaining.min(SCROLL_PAGE_SIZE),
                offset: offset.take(),
                with_payload: [PAYLOAD_SOURCE, PAYLOAD_CONTENT_HASH],
                with_vector: false,
            };
            let page: ScrollResult = self
                .send(
                    self.client
                        .post(self.collection_url("/points/scroll"))
                        .json(&request),
                )
                .await?;

            records.extend(page.points.into_iter().map(|point| {
                IndexedRecord::new(
                    point.id.to_string(),
                    payload_str(point.payload.as_ref(), PAYLOAD_SOURCE),
                    payload_str(point.payload.as_ref(), PAYLOAD_CONTENT_HASH),
                )
            }));

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        records.truncate(limit);
        Ok(records)
    }

    async fn upsert(&self, record: &DocumentRecord) -> Result<()> {
        let request = UpsertRequest {
            points: [PointWrite {
                id: PointId::parse(&record.id),
                vector: &record.embedding,
                payload: record.payload(),
            }],
        };
        let _: serde_json::Value = self
            .send(
                self.client
                    .put(self.collection_url("/points?wait=true"))
                    .json(&request),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let request = DeleteRequest {
            points: [PointId::parse(id)],
        };
        let _: serde_json::Value = self
            .send(
                self.client
                    .post(self.collection_url("/points/delete?wait=true"))
                    .json(&request),
            )
            .await?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
        let request = SearchRequest {
            vector,
            limit: top_k,
            with_payload: true,
        };
        let hits: Vec<SearchHit> = self
            .send(
                self.client
                    .post(self.collection_url("/points/search"))
                    .json(&request),
            )
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| ScoredDocument {
                id: hit.id.to_string(),
                source: payload_str(hit.payload.as_ref(), PAYLOAD_SOURCE),
                text: payload_str(hit.payload.as_ref(), PAYLOAD_TEXT).unwrap_or_default(),
                score: hit.score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let result: CountResult = self
            .send(
                self.client
                    .post(self.collection_url("/points/count"))
                    .json(&serde_json::json!({ "exact": true })),
            )
            .await?;
        Ok(result.count)
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/healthz", self.base_url()))
            .send()
            .await
            .map_err(|e| StorageError::from_transport(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StorageError::Unavailable(format!(
                "health check returned {}",
                response.status()
            ))
            .into())
        }
    }
}
