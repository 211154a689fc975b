use crate::models::{ChunkPayload, IndexPoint, ScoredPoint, SparseVector};
use crate::sparse::SPARSE_MODEL_NAME;
use crate::traits::{KeywordIndex, VectorIndex};
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use url::Url;

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";
const UPSERT_BATCH: usize = 64;

/// Vector names a collection is configured with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionVectors {
    pub dense: Vec<(String, Option<u64>)>,
    pub sparse: Vec<String>,
}

pub struct QdrantStore {
    endpoint: Url,
    collection: String,
    vector_name: String,
    client: Client,
}

impl QdrantStore {
    pub fn new(
        endpoint: &str,
        collection: impl Into<String>,
        vector_name: impl Into<String>,
    ) -> Result<Self, SearchError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            collection: collection.into(),
            vector_name: vector_name.into(),
            client: Client::new(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn collection_url(&self, tail: &[&str]) -> Result<Url, SearchError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| SearchError::Request(format!("qdrant url cannot be a base: {}", self.endpoint)))?
            .pop_if_empty()
            .push("collections")
            .push(&self.collection)
            .extend(tail);
        Ok(url)
    }

    async fn checked_json(response: reqwest::Response) -> Result<Value, SearchError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: format!("{status}: {body}"),
            });
        }
        Ok(response.json().await?)
    }

    pub async fn collection_exists(&self) -> Result<bool, SearchError> {
        let response = self.client.get(self.collection_url(&[])?).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: status.to_string(),
            }),
        }
    }

    pub async fn create_collection(&self, dimensions: usize, with_sparse: bool) -> Result<(), SearchError> {
        let mut body = json!({
            "vectors": {
                self.vector_name.as_str(): { "size": dimensions, "distance": "Cosine" }
            }
        });
        if with_sparse {
            body["sparse_vectors"] = json!({ SPARSE_MODEL_NAME: { "modifier": "idf" } });
        }

        let response = self
            .client
            .put(self.collection_url(&[])?)
            .json(&body)
            .send()
            .await?;
        Self::checked_json(response).await?;
        tracing::info!(collection = %self.collection, dimensions, with_sparse, "created qdrant collection");
        Ok(())
    }

    pub async fn collection_vectors(&self) -> Result<CollectionVectors, SearchError> {
        let response = self.client.get(self.collection_url(&[])?).send().await?;
        let info = Self::checked_json(response).await?;
        Ok(parse_collection_vectors(&info))
    }

    /// Checks the collection holds exactly the dense vector this store writes
    /// (with the expected size) and, for hybrid use, exactly the bm25 sparse
    /// vector.
    pub fn validate(
        &self,
        vectors: &CollectionVectors,
        dimensions: usize,
        with_sparse: bool,
    ) -> Result<(), SearchError> {
        let mismatch = |details: String| SearchError::CollectionMismatch {
            collection: self.collection.clone(),
            details,
        };

        let dense_names = vectors.dense.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
        if dense_names != [self.vector_name.as_str()] {
            return Err(mismatch(format!(
                "dense vectors {dense_names:?} do not match model '{}'",
                self.vector_name
            )));
        }

        if let Some((_, Some(size))) = vectors.dense.first() {
            if *size != dimensions as u64 {
                return Err(mismatch(format!("vector size {size} != embedder dimension {dimensions}")));
            }
        }

        if with_sparse && vectors.sparse != [SPARSE_MODEL_NAME] {
            return Err(mismatch(format!(
                "sparse vectors {:?} do not match model '{SPARSE_MODEL_NAME}'",
                vectors.sparse
            )));
        }

        Ok(())
    }

    async fn query(&self, body: Value) -> Result<Vec<ScoredPoint>, SearchError> {
        let response = self
            .client
            .post(self.collection_url(&["points", "query"])?)
            .json(&body)
            .send()
            .await?;
        let parsed = Self::checked_json(response).await?;
        Ok(parse_points(&parsed))
    }
}

pub fn parse_collection_vectors(info: &Value) -> CollectionVectors {
    let params = info.pointer("/result/config/params");

    let dense = match params.and_then(|params| params.get("vectors")) {
        // An unnamed vector config carries `size` directly and has no names.
        Some(Value::Object(map)) if map.contains_key("size") => Vec::new(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, config)| (name.clone(), config.get("size").and_then(Value::as_u64)))
            .collect(),
        _ => Vec::new(),
    };

    let sparse = params
        .and_then(|params| params.get("sparse_vectors"))
        .and_then(Value::as_object)
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();

    CollectionVectors { dense, sparse }
}

pub fn parse_points(response: &Value) -> Vec<ScoredPoint> {
    let points = response
        .pointer("/result/points")
        .or_else(|| response.pointer("/result"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    points
        .into_iter()
        .filter_map(|point| {
            let Some(id) = point.get("id").and_then(Value::as_u64) else {
                tracing::warn!(id = ?point.get("id"), "skipping point with non-numeric id");
                return None;
            };
            let score = point.get("score").and_then(Value::as_f64).unwrap_or(0.0);
            let payload = point
                .get("payload")
                .cloned()
                .and_then(|payload| serde_json::from_value::<ChunkPayload>(payload).ok())
                .unwrap_or_default();
            Some(ScoredPoint { id, score, payload })
        })
        .collect()
}

fn point_body(point: &IndexPoint, vector_name: &str) -> Result<Value, SearchError> {
    let mut vectors = Map::new();
    vectors.insert(vector_name.to_string(), json!(point.dense));
    if let Some(sparse) = &point.sparse {
        vectors.insert(SPARSE_MODEL_NAME.to_string(), serde_json::to_value(sparse)?);
    }

    Ok(json!({
        "id": point.id,
        "vector": Value::Object(vectors),
        "payload": serde_json::to_value(&point.payload)?,
    }))
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn ensure_collection(&self, dimensions: usize, with_sparse: bool) -> Result<(), SearchError> {
        if !self.collection_exists().await? {
            self.create_collection(dimensions, with_sparse).await?;
        }
        let vectors = self.collection_vectors().await?;
        self.validate(&vectors, dimensions, with_sparse)
    }

    async fn upsert_points(&self, points: &[IndexPoint]) -> Result<(), SearchError> {
        for batch in points.chunks(UPSERT_BATCH) {
            let body = batch
                .iter()
                .map(|point| point_body(point, &self.vector_name))
                .collect::<Result<Vec<_>, _>>()?;

            let mut url = self.collection_url(&["points"])?;
            url.set_query(Some("wait=true"));
            let response = self
                .client
                .put(url)
                .json(&json!({ "points": body }))
                .send()
                .await?;
            Self::checked_json(response).await?;
            tracing::debug!(collection = %self.collection, points = batch.len(), "upserted batch");
        }
        Ok(())
    }

    async fn search_dense(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>, SearchError> {
        self.query(json!({
            "query": vector,
            "using": self.vector_name,
            "limit": limit,
            "with_payload": true,
        }))
        .await
    }
}

#[async_trait]
impl KeywordIndex for QdrantStore {
    async fn search_sparse(
        &self,
        vector: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, SearchError> {
        if vector.is_empty() {
            return Ok(Vec::new());
        }

        self.query(json!({
            "query": { "indices": vector.indices, "values": vector.values },
            "using": SPARSE_MODEL_NAME,
            "limit": limit,
            "with_payload": true,
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> QdrantStore {
        QdrantStore::new("http://localhost:6333", "manuals", "all-mpnet-base-v2").unwrap()
    }

    #[test]
    fn collection_url_escapes_names() {
        let store = QdrantStore::new("http://qdrant:6333/", "my manuals", "m").unwrap();
        let url = store.collection_url(&["points", "query"]).unwrap();
        assert_eq!(url.as_str(), "http://qdrant:6333/collections/my%20manuals/points/query");
    }

    #[test]
    fn named_and_sparse_vectors_are_read() {
        let info = json!({
            "result": { "config": { "params": {
                "vectors": { "all-mpnet-base-v2": { "size": 768, "distance": "Cosine" } },
                "sparse_vectors": { "bm25": { "modifier": "idf" } }
            }}}
        });

        let vectors = parse_collection_vectors(&info);
        assert_eq!(vectors.dense, vec![("all-mpnet-base-v2".to_string(), Some(768))]);
        assert_eq!(vectors.sparse, vec!["bm25".to_string()]);
        assert!(store().validate(&vectors, 768, true).is_ok());
    }

    #[test]
    fn unnamed_or_foreign_vectors_fail_validation() {
        let unnamed = parse_collection_vectors(&json!({
            "result": { "config": { "params": { "vectors": { "size": 768, "distance": "Cosine" } } } }
        }));
        assert!(matches!(
            store().validate(&unnamed, 768, false),
            Err(SearchError::CollectionMismatch { .. })
        ));

        let dense_only = CollectionVectors {
            dense: vec![("all-mpnet-base-v2".to_string(), Some(768))],
            sparse: Vec::new(),
        };
        assert!(store().validate(&dense_only, 768, false).is_ok());
        assert!(store().validate(&dense_only, 768, true).is_err());
        assert!(store().validate(&dense_only, 384, false).is_err());
    }

    #[test]
    fn query_points_are_parsed_with_payload() {
        let response = json!({
            "result": { "points": [
                { "id": 7, "score": 0.82, "payload": {
                    "content": "Check the fan.", "main_chapter": "Maintenance",
                    "chapter": "Cooling fan", "manual": "FR-A800", "page": 112 } },
                { "id": "5c56c793-69f3-4fbf-87e6-c4bf54c28c26", "score": 0.5 }
            ]}
        });

        let points = parse_points(&response);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, 7);
        assert_eq!(points[0].payload.chapter, "Cooling fan");
        assert_eq!(points[0].payload.page, 112);
    }

    #[test]
    fn point_body_names_both_vectors() {
        let point = IndexPoint {
            id: 3,
            dense: vec![0.1, 0.2],
            sparse: Some(SparseVector {
                indices: vec![9],
                values: vec![1.5],
            }),
            payload: ChunkPayload::default(),
        };

        let body = point_body(&point, "all-mpnet-base-v2").unwrap();
        assert_eq!(body["id"], 3);
        assert!(body["vector"]["all-mpnet-base-v2"].is_array());
        assert_eq!(body["vector"]["bm25"]["indices"][0], 9);
        assert!(body["payload"].get("context").is_none());
    }
}
