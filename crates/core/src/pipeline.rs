//! Ingestion orchestration: extract, chunk, embed, and index documents and
//! course content trees, with per-batch failure isolation.

use crate::chunking::build_chunks;
use crate::config::SearchConfig;
use crate::error::IngestError;
use crate::extractor::{self, ExtractorOptions};
use crate::metadata::Metadata;
use crate::models::{
    BatchFailure, CourseContent, IngestionReport, ProcessedDocument, VectorRecord,
};
use crate::traits::{Embedder, VectorIndex};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::{info, warn};
use walkdir::WalkDir;

/// One embeddable unit queued for indexing. `text` is stored whole on the
/// record; only the provider input is truncated.
struct IndexUnit {
    id: String,
    text: String,
    metadata: Metadata,
}

pub struct IngestionPipeline<E: ?Sized, V: ?Sized> {
    embedder: Arc<E>,
    index: Arc<V>,
    config: SearchConfig,
}

impl<E, V> IngestionPipeline<E, V>
where
    E: Embedder + ?Sized,
    V: VectorIndex + ?Sized,
{
    pub fn new(embedder: Arc<E>, index: Arc<V>, config: SearchConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            embedder,
            index,
            config,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Extract and chunk one file without touching the index. The returned
    /// value is what `ingest_document` would index.
    pub fn process_document(&self, path: &Path) -> Result<ProcessedDocument, IngestError> {
        let file_size = fs::metadata(path)?.len();
        let options = ExtractorOptions {
            max_file_size: self.config.max_file_size,
            ocr: self.config.ocr.clone(),
        };
        let (content, metadata) = extractor::extract(path, &options)?;

        let chunks = build_chunks(
            &content,
            &metadata,
            self.config.chunk_size,
            self.config.chunk_overlap,
        )?;

        Ok(ProcessedDocument {
            doc_id: document_id(path)?,
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_type: path
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
            word_count: content.split_whitespace().count(),
            content,
            chunks,
            metadata,
            file_size,
        })
    }

    /// Index one file: a whole-document record plus one record per chunk,
    /// all ids namespaced under `prefix`.
    pub async fn ingest_document(
        &self,
        path: &Path,
        prefix: &str,
    ) -> Result<IngestionReport, IngestError> {
        let document = self.process_document(path)?;
        if document.content.trim().is_empty() {
            return Err(IngestError::Validation(format!(
                "no indexable text in {}",
                path.display()
            )));
        }

        let mut units = Vec::with_capacity(document.chunks.len() + 1);

        let mut doc_metadata = document.metadata.clone();
        doc_metadata.insert("filename".to_string(), document.filename.clone().into());
        doc_metadata.insert("file_type".to_string(), document.file_type.clone().into());
        doc_metadata.insert("doc_id".to_string(), document.doc_id.clone().into());
        doc_metadata.insert("total_chunks".to_string(), document.chunks.len().into());
        doc_metadata.insert("word_count".to_string(), document.word_count.into());
        doc_metadata.insert("record_type".to_string(), "document".into());
        units.push(IndexUnit {
            id: format!("{prefix}_{}", document.doc_id),
            text: document.content.clone(),
            metadata: doc_metadata,
        });

        for chunk in &document.chunks {
            let mut metadata = chunk.metadata.clone();
            metadata.insert("filename".to_string(), document.filename.clone().into());
            metadata.insert("file_type".to_string(), document.file_type.clone().into());
            metadata.insert("doc_id".to_string(), document.doc_id.clone().into());
            metadata.insert("chunk_index".to_string(), chunk.chunk_index.into());
            metadata.insert("start_char".to_string(), chunk.start_char.into());
            metadata.insert("end_char".to_string(), chunk.end_char.into());
            metadata.insert("record_type".to_string(), "chunk".into());
            units.push(IndexUnit {
                id: format!("{prefix}_{}_chunk_{}", document.doc_id, chunk.chunk_index),
                text: chunk.content.clone(),
                metadata,
            });
        }

        let report = self.index_units(units).await;
        info!(
            file = %path.display(),
            doc_id = %document.doc_id,
            indexed = report.indexed_count,
            failed = report.errors.len(),
            "ingested document"
        );
        Ok(report)
    }

    /// Index a course content tree: the course, each chapter, and each
    /// lesson become independently retrievable units, all carrying a
    /// `course_id` field for filtered search.
    pub async fn ingest_course(&self, course: &CourseContent) -> IngestionReport {
        let mut units = Vec::new();

        let mut lines = vec![course.title.clone()];
        if !course.description.is_empty() {
            lines.push(course.description.clone());
        }
        if let Some(subject) = &course.subject {
            lines.push(format!("Subject: {subject}"));
        }
        if let Some(grade) = &course.grade_level {
            lines.push(format!("Grade level: {grade}"));
        }

        let mut metadata = Metadata::new();
        metadata.insert("type".to_string(), "course".into());
        metadata.insert("course_id".to_string(), course.course_id.into());
        metadata.insert("title".to_string(), course.title.clone().into());
        if let Some(subject) = &course.subject {
            metadata.insert("subject".to_string(), subject.clone().into());
        }
        units.push(IndexUnit {
            id: format!("course_{}", course.course_id),
            text: lines.join("\n"),
            metadata,
        });

        for chapter in &course.chapters {
            let mut text = chapter.title.clone();
            if let Some(description) = &chapter.description {
                text.push('\n');
                text.push_str(description);
            }

            let mut metadata = Metadata::new();
            metadata.insert("type".to_string(), "chapter".into());
            metadata.insert("course_id".to_string(), course.course_id.into());
            metadata.insert("chapter_id".to_string(), chapter.id.into());
            metadata.insert("title".to_string(), chapter.title.clone().into());
            metadata.insert("order".to_string(), i64::from(chapter.order).into());
            units.push(IndexUnit {
                id: format!("chapter_{}", chapter.id),
                text,
                metadata,
            });

            for lesson in &chapter.lessons {
                let mut metadata = Metadata::new();
                metadata.insert("type".to_string(), "lesson".into());
                metadata.insert("course_id".to_string(), course.course_id.into());
                metadata.insert("chapter_id".to_string(), chapter.id.into());
                metadata.insert("lesson_id".to_string(), lesson.id.into());
                metadata.insert("title".to_string(), lesson.title.clone().into());
                if let Some(duration) = lesson.duration_minutes {
                    metadata.insert(
                        "duration_minutes".to_string(),
                        i64::from(duration).into(),
                    );
                }
                units.push(IndexUnit {
                    id: format!("lesson_{}", lesson.id),
                    text: format!("{}\n{}", lesson.title, lesson.content),
                    metadata,
                });
            }
        }

        let report = self.index_units(units).await;
        info!(
            course_id = course.course_id,
            indexed = report.indexed_count,
            failed = report.errors.len(),
            "ingested course content"
        );
        report
    }

    /// Recursively ingest every supported file under `directory`. One bad
    /// file never aborts the walk; its failure lands in the report.
    pub async fn ingest_folder(
        &self,
        directory: &Path,
        prefix: &str,
    ) -> Result<IngestionReport, IngestError> {
        let mut files: Vec<_> = WalkDir::new(directory)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| extractor::is_supported_extension(&ext.to_lowercase()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(IngestError::Validation(format!(
                "no supported files under {}",
                directory.display()
            )));
        }

        let mut report = IngestionReport::default();
        for file in files {
            match self.ingest_document(&file, prefix).await {
                Ok(partial) => report.merge(partial),
                Err(error) => {
                    warn!(file = %file.display(), %error, "skipping file after ingestion failure");
                    report.total += 1;
                    report.errors.push(BatchFailure {
                        id: file.display().to_string(),
                        reason: error.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Remove a previously ingested document and all of its chunk records.
    /// Returns how many records were removed; an unknown document is 0,
    /// not an error.
    pub async fn delete_document(&self, prefix: &str, doc_id: &str) -> Result<usize, IngestError> {
        let document_record_id = format!("{prefix}_{doc_id}");
        let record = match self.index.get(&document_record_id).await? {
            Some(record) => record,
            None => {
                warn!(doc_id, "document record not found, nothing to delete");
                return Ok(0);
            }
        };

        let total_chunks = record
            .metadata
            .get("total_chunks")
            .and_then(|value| value.as_int())
            .unwrap_or(0)
            .max(0) as usize;

        let mut ids = vec![document_record_id];
        for index in 0..total_chunks {
            ids.push(format!("{prefix}_{doc_id}_chunk_{index}"));
        }

        let removed = self.index.delete(&ids).await?;
        info!(doc_id, removed, "deleted document records");
        Ok(removed)
    }

    /// Embed and upsert units in batches. A failed batch is reported per
    /// unit and the job moves on to the next batch.
    async fn index_units(&self, units: Vec<IndexUnit>) -> IngestionReport {
        let mut report = IngestionReport {
            total: units.len(),
            ..IngestionReport::default()
        };

        let max_input = self
            .config
            .embedding
            .max_input_chars
            .min(self.embedder.max_input_chars());

        for batch in units.chunks(self.config.batch_size) {
            let inputs: Vec<String> = batch
                .iter()
                .map(|unit| truncate_chars(&unit.text, max_input))
                .collect();

            let embeddings = match self.embedder.embed_batch(&inputs).await {
                Ok(embeddings) => embeddings,
                Err(error) => {
                    warn!(%error, batch_size = batch.len(), "embedding batch failed");
                    report.fail_batch(batch, &error.to_string());
                    continue;
                }
            };

            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(embeddings)
                .map(|(unit, embedding)| VectorRecord {
                    id: unit.id.clone(),
                    embedding,
                    metadata: unit.metadata.clone(),
                    document: unit.text.clone(),
                })
                .collect();

            match self.index.add(records).await {
                Ok(()) => report.indexed_count += batch.len(),
                Err(error) => {
                    warn!(%error, batch_size = batch.len(), "indexing batch failed");
                    report.fail_batch(batch, &error.to_string());
                }
            }
        }

        report
    }
}

impl IngestionReport {
    fn fail_batch(&mut self, batch: &[IndexUnit], reason: &str) {
        for unit in batch {
            self.errors.push(BatchFailure {
                id: unit.id.clone(),
                reason: reason.to_string(),
            });
        }
    }
}

/// Stable document identity: the first 16 hex digits of a SHA-256 over the
/// absolute path and modification time. An edited file gets a new id; an
/// unchanged file re-ingests onto the same records.
fn document_id(path: &Path) -> Result<String, IngestError> {
    let absolute = path.canonicalize()?;
    let modified = fs::metadata(&absolute)?
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", absolute.display(), modified).as_bytes());
    let digest = hasher.finalize();

    let mut id = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        id.push_str(&format!("{byte:02x}"));
    }
    Ok(id)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}
