use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("pdf has no table of contents: {0}")]
    MissingToc(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unmatched sections remain: {0:?}")]
    UnmatchedSections(Vec<String>),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("history log error: {0}")]
    History(#[from] std::io::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("collection '{collection}' does not match: {details}")]
    CollectionMismatch { collection: String, details: String },
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("llm service error (HTTP {status}): {body}")]
    Service { status: u16, body: String },

    #[error("llm returned no choices")]
    EmptyResponse,

    #[error("unknown prompt template: {0}")]
    UnknownPrompt(String),

    #[error("prompt file error: {0}")]
    PromptFile(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid secrets file {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing setting: {0}")]
    Missing(String),
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
