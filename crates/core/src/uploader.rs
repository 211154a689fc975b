use crate::embeddings::Embedder;
use crate::metadata::{manual_title, meta_path_for_chunks, read_metadata, UNKNOWN_MANUAL};
use crate::models::{ChunkPayload, ChunkRecord, IndexPoint, UploadMode};
use crate::sparse::SparseEncoder;
use crate::traits::VectorIndex;
use crate::{IngestError, SearchError};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Chunks and manual title ready for upload.
#[derive(Debug, Clone)]
pub struct UploadInput {
    pub chunks: Vec<ChunkRecord>,
    pub title: String,
    pub contexts: BTreeMap<usize, String>,
}

/// Reads a chunk file, the metadata file next to it and, optionally, a
/// generated context file.
///
/// Hybrid uploads require the metadata file; a missing one is an `Io` error.
/// Dense uploads fall back to an unknown manual title.
pub fn load_upload_input(
    chunk_path: &Path,
    context_path: Option<&Path>,
    mode: UploadMode,
) -> Result<UploadInput, IngestError> {
    let chunks: Vec<ChunkRecord> = serde_json::from_str(&std::fs::read_to_string(chunk_path)?)?;

    let meta_path = meta_path_for_chunks(chunk_path)?;
    let title = if mode.with_sparse() || meta_path.exists() {
        let (metadata, found) = read_metadata(&meta_path)?;
        if found {
            tracing::info!(path = %meta_path.display(), "found metadata");
        }
        manual_title(&metadata)
    } else {
        tracing::warn!(path = %meta_path.display(), "no metadata file, manual title unknown");
        UNKNOWN_MANUAL.to_string()
    };

    let contexts = match context_path {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => BTreeMap::new(),
    };

    Ok(UploadInput {
        chunks,
        title,
        contexts,
    })
}

pub struct EmbeddingUploader<V: VectorIndex> {
    index: V,
    embedder: Arc<dyn Embedder>,
    sparse: SparseEncoder,
}

impl<V: VectorIndex> EmbeddingUploader<V> {
    pub fn new(index: V, embedder: Arc<dyn Embedder>, sparse: SparseEncoder) -> Self {
        Self {
            index,
            embedder,
            sparse,
        }
    }

    /// Builds one point per chunk. `main_chapter` follows the latest
    /// top-level chunk.
    pub async fn build_points(&self, input: &UploadInput, mode: UploadMode) -> Result<Vec<IndexPoint>, SearchError> {
        let texts = input
            .chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| match input.contexts.get(&index) {
                Some(context) => format!("{context}\n\n{}", chunk.text),
                None => chunk.text.clone(),
            })
            .collect::<Vec<_>>();

        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(SearchError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                texts.len()
            )));
        }

        let mut main_chapter = String::new();
        let mut points = Vec::with_capacity(texts.len());
        for (index, ((chunk, text), dense)) in input.chunks.iter().zip(&texts).zip(vectors).enumerate() {
            if chunk.level == 1 {
                main_chapter = chunk.title.clone();
            }

            points.push(IndexPoint {
                id: index as u64,
                dense,
                sparse: mode.with_sparse().then(|| self.sparse.encode_document(text)),
                payload: ChunkPayload {
                    content: chunk.text.clone(),
                    main_chapter: main_chapter.clone(),
                    chapter: chunk.title.clone(),
                    manual: input.title.clone(),
                    page: chunk.page,
                    context: input.contexts.get(&index).cloned(),
                },
            });
        }

        Ok(points)
    }

    pub async fn upload(&self, input: &UploadInput, mode: UploadMode) -> Result<usize, SearchError> {
        self.index
            .ensure_collection(self.embedder.dimensions(), mode.with_sparse())
            .await?;

        let points = self.build_points(input, mode).await?;
        tracing::info!(manual = %input.title, points = points.len(), ?mode, "uploading points");
        self.index.upsert_points(&points).await?;
        Ok(points.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::search::tests::FakeVectorIndex;
    use tempfile::tempdir;

    fn chunk(level: u32, title: &str, text: &str) -> ChunkRecord {
        ChunkRecord {
            level,
            title: title.to_string(),
            page: level * 10,
            text: text.to_string(),
        }
    }

    fn uploader() -> EmbeddingUploader<FakeVectorIndex> {
        EmbeddingUploader::new(
            FakeVectorIndex::default(),
            Arc::new(CharacterNgramEmbedder::default()),
            SparseEncoder::new().unwrap(),
        )
    }

    #[tokio::test]
    async fn main_chapter_tracks_top_level_chunks() {
        let input = UploadInput {
            chunks: vec![
                chunk(2, "Preface", "before any chapter"),
                chunk(1, "Installation", "mount the unit"),
                chunk(2, "Wiring", "connect the cables"),
            ],
            title: "FR-E800".to_string(),
            contexts: BTreeMap::from([(2, "Part of installation.".to_string())]),
        };

        let uploader = uploader();
        let written = uploader.upload(&input, UploadMode::Hybrid).await.unwrap();

        assert_eq!(written, 3);
        let ensured = uploader.index.ensured.lock().unwrap().clone();
        assert_eq!(ensured, vec![(128, true)]);

        let points = uploader.index.upserted.lock().unwrap().clone();
        assert_eq!(points[0].payload.main_chapter, "");
        assert_eq!(points[2].payload.main_chapter, "Installation");
        assert_eq!(points[2].payload.chapter, "Wiring");
        assert_eq!(points[2].payload.context.as_deref(), Some("Part of installation."));
        assert_eq!(points[2].payload.content, "connect the cables");
        assert!(points.iter().all(|point| point.sparse.is_some()));
        assert_eq!(points.iter().map(|p| p.id).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn dense_upload_has_no_sparse_vectors() {
        let input = UploadInput {
            chunks: vec![chunk(1, "Intro", "text")],
            title: UNKNOWN_MANUAL.to_string(),
            contexts: BTreeMap::new(),
        };

        let points = uploader().build_points(&input, UploadMode::Dense).await.unwrap();
        assert!(points[0].sparse.is_none());
    }

    #[test]
    fn upload_input_reads_title_from_metadata() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let chunks = dir.path().join("fr-e800_chunked.json");
        std::fs::write(&chunks, serde_json::to_string(&vec![chunk(1, "Intro", "text")])?)?;
        std::fs::write(dir.path().join("fr-e800_meta.json"), r#"{"title": "FR-E800 Manual"}"#)?;
        let contexts = dir.path().join("fr-e800_context.json");
        std::fs::write(&contexts, r#"{"0": "Opening chapter."}"#)?;

        let input = load_upload_input(&chunks, Some(&contexts), UploadMode::Hybrid)?;

        assert_eq!(input.title, "FR-E800 Manual");
        assert_eq!(input.chunks.len(), 1);
        assert_eq!(input.contexts.get(&0).map(String::as_str), Some("Opening chapter."));
        Ok(())
    }

    #[test]
    fn hybrid_upload_requires_metadata_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let chunks = dir.path().join("x_chunked.json");
        std::fs::write(&chunks, "[]")?;

        let result = load_upload_input(&chunks, None, UploadMode::Hybrid);
        assert!(matches!(result, Err(IngestError::Io(error)) if error.kind() == std::io::ErrorKind::NotFound));
        Ok(())
    }

    #[test]
    fn dense_upload_without_metadata_is_unknown_manual() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let chunks = dir.path().join("x_chunked.json");
        std::fs::write(&chunks, "[]")?;

        let input = load_upload_input(&chunks, None, UploadMode::Dense)?;
        assert_eq!(input.title, UNKNOWN_MANUAL);
        Ok(())
    }
}
