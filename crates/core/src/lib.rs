pub mod chat;
pub mod chunking;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod fusion;
pub mod history;
pub mod ingest;
pub mod llm;
pub mod markdown;
pub mod metadata;
pub mod models;
pub mod prompts;
pub mod rag;
pub mod search;
pub mod sparse;
pub mod stores;
pub mod toc_match;
pub mod traits;
pub mod uploader;

pub use chat::ChatSession;
pub use chunking::{chunk_file, chunk_sections, chunk_text_by_lines, ChunkingConfig, RegexTokenCounter, TokenCounter};
pub use config::Secrets;
pub use context::{ContextGenerator, ContextOptions};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HttpEmbedder, HttpEmbedderConfig, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL,
};
pub use error::{ConfigError, ContextError, IngestError, LlmError, RagError, SearchError};
pub use extractor::{ExtractedPdf, LopdfExtractor, PageText, PdfExtractor};
pub use fusion::{reciprocal_rank_fusion, RRF_K};
pub use history::HistoryLog;
pub use ingest::{
    convert_folder_best_effort, convert_pdf, discover_pdf_files, ConversionReport, ConvertOptions, ConvertedManual,
    SkippedPdf,
};
pub use llm::{ChatMessage, ChatModel, LlmConfig, OpenAiChatClient};
pub use models::{
    ChunkPayload, ChunkRecord, DocumentMetadata, HistoryRecord, IndexPoint, ScoredPoint, SearchMode, SparseVector,
    TocEntry, TocSection, UploadMode,
};
pub use prompts::PromptLoader;
pub use rag::{RagAnswer, RagBackend, RagOptions, RagPipeline};
pub use search::Searcher;
pub use sparse::SparseEncoder;
pub use stores::QdrantStore;
pub use traits::{KeywordIndex, VectorIndex};
pub use uploader::{load_upload_input, EmbeddingUploader, UploadInput};
