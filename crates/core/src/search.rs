use crate::embeddings::Embedder;
use crate::fusion::{reciprocal_rank_fusion, RRF_K};
use crate::history::HistoryLog;
use crate::models::{ScoredPoint, SearchMode};
use crate::sparse::SparseEncoder;
use crate::traits::{KeywordIndex, VectorIndex};
use crate::SearchError;
use std::sync::Arc;

/// Each side of a hybrid query fetches this many times the final limit.
pub const PREFETCH_FACTOR: usize = 5;

pub struct Searcher<V, K>
where
    V: VectorIndex,
    K: KeywordIndex,
{
    vector: V,
    keyword: K,
    embedder: Arc<dyn Embedder>,
    sparse: SparseEncoder,
    history: Option<HistoryLog>,
    rrf_k: f64,
}

impl<V, K> Searcher<V, K>
where
    V: VectorIndex,
    K: KeywordIndex,
{
    pub fn new(vector: V, keyword: K, embedder: Arc<dyn Embedder>, sparse: SparseEncoder) -> Self {
        Self {
            vector,
            keyword,
            embedder,
            sparse,
            history: None,
            rrf_k: RRF_K,
        }
    }

    pub fn with_history(mut self, history: HistoryLog) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_rrf_k(mut self, rrf_k: f64) -> Self {
        self.rrf_k = rrf_k;
        self
    }

    fn check_query(query: &str) -> Result<(), SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }
        Ok(())
    }

    async fn log(
        &self,
        query: &str,
        mode: SearchMode,
        limit: usize,
        results: &[ScoredPoint],
    ) -> Result<(), SearchError> {
        if let Some(history) = &self.history {
            history.record(query, mode, limit, results).await?;
        }
        Ok(())
    }

    /// Dense-only similarity search.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredPoint>, SearchError> {
        Self::check_query(query)?;
        let vector = self.embedder.embed(query).await?;
        let results = self.vector.search_dense(&vector, limit).await?;

        tracing::debug!(query, limit, hits = results.len(), "dense search");
        self.log(query, SearchMode::Dense, limit, &results).await?;
        Ok(results)
    }

    /// Dense and sparse retrieval fused with reciprocal rank fusion.
    pub async fn rrf_search(&self, query: &str, limit: usize) -> Result<Vec<ScoredPoint>, SearchError> {
        Self::check_query(query)?;
        let prefetch = limit.saturating_mul(PREFETCH_FACTOR);
        let dense_vector = self.embedder.embed(query).await?;
        let sparse_vector = self.sparse.encode_query(query);

        let (dense_hits, sparse_hits) = tokio::try_join!(
            self.vector.search_dense(&dense_vector, prefetch),
            self.keyword.search_sparse(&sparse_vector, prefetch)
        )?;

        let results = reciprocal_rank_fusion(&[dense_hits, sparse_hits], self.rrf_k, limit);

        tracing::debug!(query, limit, hits = results.len(), "hybrid search");
        self.log(query, SearchMode::Hybrid, limit, &results).await?;
        Ok(results)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{ChunkPayload, IndexPoint, SparseVector};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    pub(crate) fn point(id: u64, content: &str) -> ScoredPoint {
        ScoredPoint {
            id,
            score: 1.0,
            payload: ChunkPayload {
                content: content.to_string(),
                ..ChunkPayload::default()
            },
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeVectorIndex {
        pub hits: Vec<ScoredPoint>,
        pub limits: Mutex<Vec<usize>>,
        pub upserted: Mutex<Vec<IndexPoint>>,
        pub ensured: Mutex<Vec<(usize, bool)>>,
    }

    #[async_trait]
    impl VectorIndex for FakeVectorIndex {
        async fn ensure_collection(&self, dimensions: usize, with_sparse: bool) -> Result<(), SearchError> {
            self.ensured.lock().unwrap().push((dimensions, with_sparse));
            Ok(())
        }

        async fn upsert_points(&self, points: &[IndexPoint]) -> Result<(), SearchError> {
            self.upserted.lock().unwrap().extend_from_slice(points);
            Ok(())
        }

        async fn search_dense(&self, _vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>, SearchError> {
            self.limits.lock().unwrap().push(limit);
            Ok(self.hits.iter().take(limit).cloned().collect())
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeKeywordIndex {
        pub hits: Vec<ScoredPoint>,
    }

    #[async_trait]
    impl KeywordIndex for FakeKeywordIndex {
        async fn search_sparse(
            &self,
            _vector: &SparseVector,
            limit: usize,
        ) -> Result<Vec<ScoredPoint>, SearchError> {
            Ok(self.hits.iter().take(limit).cloned().collect())
        }
    }

    pub(crate) fn searcher(dense: Vec<ScoredPoint>, sparse: Vec<ScoredPoint>) -> Searcher<FakeVectorIndex, FakeKeywordIndex> {
        Searcher::new(
            FakeVectorIndex {
                hits: dense,
                ..FakeVectorIndex::default()
            },
            FakeKeywordIndex { hits: sparse },
            Arc::new(CharacterNgramEmbedder::default()),
            SparseEncoder::new().unwrap(),
        )
    }

    #[tokio::test]
    async fn hybrid_search_prefetches_and_fuses() {
        let searcher = searcher(
            vec![point(1, "dense only"), point(2, "both")],
            vec![point(2, "both"), point(3, "sparse only")],
        );

        let results = searcher.rrf_search("inverter overcurrent", 2).await.unwrap();

        assert_eq!(results.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(*searcher.vector.limits.lock().unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let searcher = searcher(Vec::new(), Vec::new());
        assert!(matches!(
            searcher.search("   ", 5).await,
            Err(SearchError::Request(_))
        ));
    }

    #[tokio::test]
    async fn searches_are_logged_when_history_is_set() {
        let dir = tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("history.jsonl"));
        let searcher = searcher(vec![point(5, "fan")], vec![point(5, "fan")]).with_history(log.clone());

        searcher.search("cooling fan", 5).await.unwrap();
        searcher.rrf_search("cooling fan", 5).await.unwrap();

        let records = log.read_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].mode, SearchMode::Dense);
        assert_eq!(records[1].mode, SearchMode::Hybrid);
        assert_eq!(records[1].result_points_scores[0].0, 5);
    }
}
