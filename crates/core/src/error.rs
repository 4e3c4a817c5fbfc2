use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding provider error: {0}")]
    ExternalService(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("xml parse error: {0}")]
    Xml(String),

    #[error("ocr failed: {0}")]
    OcrFailed(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("collection unavailable: {0}")]
    Unavailable(String),

    #[error("corrupted collection: {0}")]
    Corrupted(String),

    #[error(
        "incompatible collection: stored model '{stored_model}' (dim {stored_dimension}) \
         does not match configured model '{active_model}' (dim {active_dimension}); \
         run an explicit migration or reset"
    )]
    Incompatible {
        stored_model: String,
        stored_dimension: usize,
        active_model: String,
        active_dimension: usize,
    },

    #[error("invalid vector: expected dimension {expected}, got {actual}")]
    InvalidVector { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query embedding failed: {0}")]
    Embedding(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
