use crate::error::{IngestError, StorageError};
use crate::metadata::Metadata;
use crate::models::{QueryHit, VectorRecord};
use async_trait::async_trait;

/// Turns text into fixed-length vectors. Stateless; performs no retries —
/// retry policy belongs to the orchestrator.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;

    /// Maximum input length per call, in characters. Callers pre-chunk or
    /// truncate; inputs past this fail with a validation error.
    fn max_input_chars(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError>;

    /// Order-preserving batch variant: `result[i]` embeds `texts[i]`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError>;
}

/// A persistent, named collection of vector records.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert: a record whose id already exists is overwritten, which makes
    /// re-indexing idempotent.
    async fn add(&self, records: Vec<VectorRecord>) -> Result<(), StorageError>;

    /// Nearest candidates by similarity, optionally restricted by an
    /// equality filter over metadata fields. Ranked best-first.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<QueryHit>, StorageError>;

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, StorageError>;

    /// Remove the given ids; missing ids are ignored. Returns how many
    /// records were actually removed.
    async fn delete(&self, ids: &[String]) -> Result<usize, StorageError>;

    async fn count(&self) -> Result<usize, StorageError>;

    /// Drop and recreate the collection. Explicit administrative resets
    /// only; nothing in the library calls this implicitly.
    async fn reset(&self) -> Result<(), StorageError>;
}
