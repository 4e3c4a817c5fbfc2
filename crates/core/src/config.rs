use crate::error::IngestError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 512;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_KEYWORD_BOOST: f64 = 0.3;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
pub const DEFAULT_MAX_INPUT_CHARS: usize = 2048;

/// Everything the pipeline and searcher need, supplied explicitly by the
/// caller. There are no hidden defaults at call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Sentence-aligned carry-back between consecutive chunks, in characters.
    pub chunk_overlap: usize,
    /// Units embedded and upserted per provider call.
    pub batch_size: usize,
    /// Weight of the lexical term in score fusion, in `[0, 1]`.
    pub keyword_boost: f64,
    /// Ceiling on source file size in bytes.
    pub max_file_size: u64,
    /// OCR fallback for image-only PDFs. `None` disables OCR.
    pub ocr: Option<OcrConfig>,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    /// Maximum input length per provider call, in characters. The pipeline
    /// truncates embedding inputs to this; stored text is never truncated.
    pub max_input_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            batch_size: DEFAULT_BATCH_SIZE,
            keyword_boost: DEFAULT_KEYWORD_BOOST,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            ocr: None,
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://dashscope.aliyuncs.com/compatible-mode/v1/embeddings".to_string(),
            api_key: None,
            model: "text-embedding-v3".to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::Validation(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::Validation(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.batch_size == 0 {
            return Err(IngestError::Validation(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.keyword_boost) {
            return Err(IngestError::Validation(format!(
                "keyword_boost {} must be within [0, 1]",
                self.keyword_boost
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(IngestError::Validation(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
