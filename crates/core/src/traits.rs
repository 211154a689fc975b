use crate::models::{IndexPoint, ScoredPoint, SparseVector};
use crate::SearchError;
use async_trait::async_trait;

/// Dense side of the point collection.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates the collection when missing and checks its vector layout
    /// matches the embedder (and the sparse encoder when `with_sparse`).
    async fn ensure_collection(&self, dimensions: usize, with_sparse: bool) -> Result<(), SearchError>;

    async fn upsert_points(&self, points: &[IndexPoint]) -> Result<(), SearchError>;

    async fn search_dense(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>, SearchError>;
}

/// Sparse lexical side of the point collection.
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    async fn search_sparse(
        &self,
        vector: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, SearchError>;
}
