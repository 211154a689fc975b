use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One outline entry of a PDF. `page` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TocEntry {
    pub level: u32,
    pub title: String,
    pub page: u32,
}

/// A ToC entry after reconciliation with the markdown export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TocSection {
    pub level: u32,
    pub title: String,
    pub page: u32,
    pub content: Option<String>,
}

impl From<TocEntry> for TocSection {
    fn from(entry: TocEntry) -> Self {
        Self {
            level: entry.level,
            title: entry.title,
            page: entry.page,
            content: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkRecord {
    pub level: u32,
    pub title: String,
    pub page: u32,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub producer: Option<String>,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub toc: Vec<TocEntry>,
}

/// Payload stored with every point in the vector collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkPayload {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub main_chapter: String,
    #[serde(default)]
    pub chapter: String,
    #[serde(default)]
    pub manual: String,
    #[serde(default)]
    pub page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct IndexPoint {
    pub id: u64,
    pub dense: Vec<f32>,
    pub sparse: Option<SparseVector>,
    pub payload: ChunkPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f64,
    pub payload: ChunkPayload,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Dense,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Dense,
    Hybrid,
}

impl UploadMode {
    pub fn with_sparse(self) -> bool {
        matches!(self, UploadMode::Hybrid)
    }
}

/// One line of the append-only search history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub query: String,
    pub mode: SearchMode,
    pub ground_truth_points: Vec<u64>,
    pub limit: usize,
    pub result_points_scores: Vec<(u64, f64)>,
    pub timestamp: DateTime<Utc>,
}
