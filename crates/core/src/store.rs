use crate::error::StorageError;
use crate::metadata::{matches_filter, Metadata};
use crate::models::{QueryHit, VectorRecord};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::info;

const MANIFEST_FILE: &str = "manifest.json";
const RECORDS_FILE: &str = "records.json";

/// Identity of a persisted collection. The manifest records which embedding
/// model populated the collection so a reopening process can detect a
/// model or dimension mismatch before querying stale vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionManifest {
    pub collection: String,
    pub embedding_model: String,
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
}

/// A single-directory persistent vector collection with cosine similarity
/// and equality filters over metadata. Writes are last-write-wins per id;
/// the dominant write pattern is idempotent re-indexing, so no transaction
/// layer is kept.
pub struct LocalVectorStore {
    directory: PathBuf,
    manifest: CollectionManifest,
    records: RwLock<BTreeMap<String, VectorRecord>>,
}

impl LocalVectorStore {
    /// Open or create the collection at `directory`. An existing manifest
    /// whose model or dimension disagrees with the arguments fails with
    /// [`StorageError::Incompatible`]; data is never dropped implicitly.
    pub fn open(
        directory: impl Into<PathBuf>,
        collection: &str,
        embedding_model: &str,
        dimension: usize,
    ) -> Result<Self, StorageError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;

        let manifest_path = directory.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            let raw = fs::read_to_string(&manifest_path)?;
            let stored: CollectionManifest = serde_json::from_str(&raw).map_err(|error| {
                StorageError::Corrupted(format!(
                    "unreadable manifest at {}: {error}",
                    manifest_path.display()
                ))
            })?;

            if stored.embedding_model != embedding_model || stored.dimension != dimension {
                return Err(StorageError::Incompatible {
                    stored_model: stored.embedding_model,
                    stored_dimension: stored.dimension,
                    active_model: embedding_model.to_string(),
                    active_dimension: dimension,
                });
            }
            stored
        } else {
            let manifest = CollectionManifest {
                collection: collection.to_string(),
                embedding_model: embedding_model.to_string(),
                dimension,
                created_at: Utc::now(),
            };
            write_atomic(&manifest_path, &serde_json::to_vec_pretty(&manifest)?)?;
            manifest
        };

        let records = load_records(&directory.join(RECORDS_FILE))?;
        info!(
            collection = %manifest.collection,
            records = records.len(),
            "opened vector collection"
        );

        Ok(Self {
            directory,
            manifest,
            records: RwLock::new(records),
        })
    }

    pub fn manifest(&self) -> &CollectionManifest {
        &self.manifest
    }

    fn persist(&self, records: &BTreeMap<String, VectorRecord>) -> Result<(), StorageError> {
        let rows: Vec<&VectorRecord> = records.values().collect();
        write_atomic(
            &self.directory.join(RECORDS_FILE),
            &serde_json::to_vec(&rows)?,
        )
    }

    fn read_lock(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, VectorRecord>>, StorageError> {
        self.records
            .read()
            .map_err(|_| StorageError::Unavailable("collection lock poisoned".to_string()))
    }

    fn write_lock(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, VectorRecord>>, StorageError> {
        self.records
            .write()
            .map_err(|_| StorageError::Unavailable("collection lock poisoned".to_string()))
    }
}

fn load_records(path: &Path) -> Result<BTreeMap<String, VectorRecord>, StorageError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = fs::read_to_string(path)?;
    let rows: Vec<VectorRecord> = serde_json::from_str(&raw).map_err(|error| {
        StorageError::Corrupted(format!("unreadable records at {}: {error}", path.display()))
    })?;
    Ok(rows.into_iter().map(|row| (row.id.clone(), row)).collect())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Cosine distance in `[0, 2]`; 0.0 for identical directions.
fn cosine_distance(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right.iter()) {
        dot += f64::from(*a) * f64::from(*b);
        left_norm += f64::from(*a) * f64::from(*a);
        right_norm += f64::from(*b) * f64::from(*b);
    }
    if left_norm == 0.0 || right_norm == 0.0 {
        return 1.0;
    }
    1.0 - dot / (left_norm.sqrt() * right_norm.sqrt())
}

#[async_trait]
impl VectorIndex for LocalVectorStore {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<(), StorageError> {
        for record in &records {
            if record.embedding.len() != self.manifest.dimension {
                return Err(StorageError::InvalidVector {
                    expected: self.manifest.dimension,
                    actual: record.embedding.len(),
                });
            }
        }

        let mut guard = self.write_lock()?;
        for record in records {
            guard.insert(record.id.clone(), record);
        }
        self.persist(&guard)
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<QueryHit>, StorageError> {
        if vector.len() != self.manifest.dimension {
            return Err(StorageError::InvalidVector {
                expected: self.manifest.dimension,
                actual: vector.len(),
            });
        }

        let guard = self.read_lock()?;
        let mut hits: Vec<QueryHit> = guard
            .values()
            .filter(|record| match filter {
                Some(filter) => matches_filter(&record.metadata, filter),
                None => true,
            })
            .map(|record| QueryHit {
                id: record.id.clone(),
                document: record.document.clone(),
                metadata: record.metadata.clone(),
                distance: cosine_distance(vector, &record.embedding),
            })
            .collect();

        hits.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, StorageError> {
        Ok(self.read_lock()?.get(id).cloned())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, StorageError> {
        let mut guard = self.write_lock()?;
        let mut removed = 0usize;
        for id in ids {
            if guard.remove(id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.persist(&guard)?;
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.read_lock()?.len())
    }

    async fn reset(&self) -> Result<(), StorageError> {
        let mut guard = self.write_lock()?;
        guard.clear();
        self.persist(&guard)?;
        info!(collection = %self.manifest.collection, "collection reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetaValue;
    use tempfile::tempdir;

    fn record(id: &str, embedding: Vec<f32>, doc: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding,
            metadata: Metadata::new(),
            document: doc.to_string(),
        }
    }

    fn open_store(dir: &Path) -> LocalVectorStore {
        LocalVectorStore::open(dir, "test", "local-ngram-v1", 3).expect("open store")
    }

    #[tokio::test]
    async fn add_is_upsert() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(dir.path());

        store
            .add(vec![record("a", vec![1.0, 0.0, 0.0], "first")])
            .await
            .expect("add");
        store
            .add(vec![record("a", vec![0.0, 1.0, 0.0], "second")])
            .await
            .expect("re-add");

        assert_eq!(store.count().await.expect("count"), 1);
        let stored = store.get("a").await.expect("get").expect("present");
        assert_eq!(stored.document, "second");
    }

    #[tokio::test]
    async fn query_ranks_by_cosine_distance() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(dir.path());
        store
            .add(vec![
                record("near", vec![1.0, 0.0, 0.0], "near"),
                record("far", vec![0.0, 1.0, 0.0], "far"),
            ])
            .await
            .expect("add");

        let hits = store
            .query(&[1.0, 0.0, 0.0], 2, None)
            .await
            .expect("query");
        assert_eq!(hits[0].id, "near");
        assert!(hits[0].distance < 1e-9);
        assert_eq!(hits[1].id, "far");
    }

    #[tokio::test]
    async fn filters_restrict_candidates() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(dir.path());

        let mut course_seven = Metadata::new();
        course_seven.insert("course_id".to_string(), MetaValue::Int(7));
        let mut course_eight = Metadata::new();
        course_eight.insert("course_id".to_string(), MetaValue::Int(8));

        store
            .add(vec![
                VectorRecord {
                    id: "in".to_string(),
                    embedding: vec![1.0, 0.0, 0.0],
                    metadata: course_seven.clone(),
                    document: "in".to_string(),
                },
                VectorRecord {
                    id: "out".to_string(),
                    embedding: vec![1.0, 0.0, 0.0],
                    metadata: course_eight,
                    document: "out".to_string(),
                },
            ])
            .await
            .expect("add");

        let hits = store
            .query(&[1.0, 0.0, 0.0], 10, Some(&course_seven))
            .await
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "in");
    }

    #[tokio::test]
    async fn delete_reports_how_many_were_removed() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(dir.path());
        store
            .add(vec![
                record("a", vec![1.0, 0.0, 0.0], "a"),
                record("b", vec![0.0, 1.0, 0.0], "b"),
            ])
            .await
            .expect("add");

        let removed = store
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .expect("delete");
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.expect("count"), 1);

        let hits = store.query(&[1.0, 0.0, 0.0], 10, None).await.expect("query");
        assert!(hits.iter().all(|hit| hit.id != "a"));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempdir().expect("tempdir");
        {
            let store = open_store(dir.path());
            store
                .add(vec![record("a", vec![1.0, 0.0, 0.0], "persisted")])
                .await
                .expect("add");
        }

        let reopened = open_store(dir.path());
        assert_eq!(reopened.count().await.expect("count"), 1);
        let stored = reopened.get("a").await.expect("get").expect("present");
        assert_eq!(stored.document, "persisted");
    }

    #[test]
    fn model_mismatch_is_refused_on_open() {
        let dir = tempdir().expect("tempdir");
        let _ = open_store(dir.path());

        let result = LocalVectorStore::open(dir.path(), "test", "other-model", 3);
        assert!(matches!(result, Err(StorageError::Incompatible { .. })));

        let result = LocalVectorStore::open(dir.path(), "test", "local-ngram-v1", 4);
        assert!(matches!(result, Err(StorageError::Incompatible { .. })));
    }

    #[tokio::test]
    async fn reset_clears_but_keeps_the_collection_usable() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(dir.path());
        store
            .add(vec![record("a", vec![1.0, 0.0, 0.0], "a")])
            .await
            .expect("add");
        store.reset().await.expect("reset");
        assert_eq!(store.count().await.expect("count"), 0);

        store
            .add(vec![record("b", vec![0.0, 1.0, 0.0], "b")])
            .await
            .expect("add after reset");
        assert_eq!(store.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn wrong_dimension_vectors_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(dir.path());
        let result = store.add(vec![record("a", vec![1.0], "a")]).await;
        assert!(matches!(result, Err(StorageError::InvalidVector { .. })));

        let result = store.query(&[1.0], 1, None).await;
        assert!(matches!(result, Err(StorageError::InvalidVector { .. })));
    }
}
