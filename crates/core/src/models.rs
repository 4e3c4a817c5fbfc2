use crate::metadata::Metadata;
use serde::{Deserialize, Serialize};

/// A bounded, sentence-aligned span of a document's extracted text. The
/// atomic unit that gets embedded and indexed. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    pub metadata: Metadata,
    pub chunk_index: usize,
    /// Character offset of the chunk start in the extracted text.
    pub start_char: usize,
    /// Character offset one past the chunk end.
    pub end_char: usize,
}

/// The result of running extraction and chunking over one source file.
/// Re-ingestion produces a fresh value; nothing here is mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedDocument {
    /// Stable identifier derived from the source path and modification time.
    pub doc_id: String,
    pub filename: String,
    pub file_type: String,
    pub content: String,
    pub chunks: Vec<DocumentChunk>,
    pub metadata: Metadata,
    pub word_count: usize,
    pub file_size: u64,
}

/// One record inside a vector collection: the embedded text, its vector,
/// and the primitive-only metadata the backend can filter on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    pub document: String,
}

/// A raw similarity candidate returned by [`crate::traits::VectorIndex::query`].
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    /// Backend distance; 0.0 is an exact match.
    pub distance: f64,
}

/// A fused search hit. Transient, produced per query, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub content: String,
    pub metadata: Metadata,
    pub score: f64,
    pub vector_score: f64,
    pub keyword_score: f64,
    pub id: String,
}

/// One unit that failed within a larger ingestion job.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub id: String,
    pub reason: String,
}

/// The summary every ingestion entry point returns. A job with failures
/// still completes; callers inspect `errors` instead of a pass/fail flag.
#[derive(Debug, Default, Serialize)]
pub struct IngestionReport {
    pub indexed_count: usize,
    pub total: usize,
    pub errors: Vec<BatchFailure>,
}

impl IngestionReport {
    pub fn merge(&mut self, other: IngestionReport) {
        self.indexed_count += other.indexed_count;
        self.total += other.total;
        self.errors.extend(other.errors);
    }
}

/// A course content tree supplied by the course-record collaborator. The
/// course, each chapter, and each lesson become independently indexed units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseContent {
    pub course_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}
