use crate::models::{HistoryRecord, ScoredPoint, SearchMode};
use crate::SearchError;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Append-only JSON-lines log of search queries and their results.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(
        &self,
        query: &str,
        mode: SearchMode,
        limit: usize,
        results: &[ScoredPoint],
    ) -> Result<(), SearchError> {
        let record = HistoryRecord {
            query: query.to_string(),
            mode,
            ground_truth_points: Vec::new(),
            limit,
            result_points_scores: results.iter().map(|point| (point.id, point.score)).collect(),
            timestamp: Utc::now(),
        };

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn read_all(&self) -> Result<Vec<HistoryRecord>, SearchError> {
        let raw = fs::read_to_string(&self.path).await?;
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(SearchError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkPayload;
    use tempfile::tempdir;

    #[tokio::test]
    async fn records_are_appended_one_per_line() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let log = HistoryLog::new(dir.path().join("data").join("search_history.jsonl"));
        let results = vec![ScoredPoint {
            id: 42,
            score: 0.75,
            payload: ChunkPayload::default(),
        }];

        log.record("alarm E.OC1", SearchMode::Dense, 5, &results).await?;
        log.record("fan replacement", SearchMode::Hybrid, 3, &[]).await?;

        let records = log.read_all().await?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].result_points_scores, vec![(42, 0.75)]);
        assert!(records[0].ground_truth_points.is_empty());
        assert_eq!(records[1].mode, SearchMode::Hybrid);
        assert_eq!(records[1].limit, 3);

        let raw = std::fs::read_to_string(log.path())?;
        assert!(raw.lines().next().unwrap_or_default().contains("\"mode\":\"dense\""));
        Ok(())
    }
}
