pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod metadata;
pub mod models;
pub mod pipeline;
pub mod searcher;
pub mod store;
pub mod traits;

pub use chunking::{build_chunks, split_sentences};
pub use config::{EmbeddingConfig, OcrConfig, SearchConfig};
pub use embeddings::{HashEmbedder, HttpEmbedder, HASH_EMBEDDER_DIMENSION};
pub use error::{IngestError, Result, SearchError, StorageError};
pub use extractor::{extract, ExtractorOptions, SUPPORTED_EXTENSIONS};
pub use metadata::{encode_value, matches_filter, sanitize, MetaValue, Metadata};
pub use models::{
    BatchFailure, Chapter, CourseContent, DocumentChunk, IngestionReport, Lesson,
    ProcessedDocument, QueryHit, SearchResult, VectorRecord,
};
pub use pipeline::IngestionPipeline;
pub use searcher::HybridSearcher;
pub use store::{CollectionManifest, LocalVectorStore};
pub use traits::{Embedder, VectorIndex};
