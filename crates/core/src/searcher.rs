//! Query-side retrieval: vector similarity fused with a lexical overlap
//! score.

use crate::error::SearchError;
use crate::metadata::Metadata;
use crate::models::SearchResult;
use crate::traits::{Embedder, VectorIndex};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct HybridSearcher<E: ?Sized, V: ?Sized> {
    embedder: Arc<E>,
    index: Arc<V>,
    /// Weight of the lexical term in `[0, 1]`: 0.0 is pure vector search,
    /// 1.0 is pure keyword overlap.
    keyword_boost: f64,
}

impl<E, V> HybridSearcher<E, V>
where
    E: Embedder + ?Sized,
    V: VectorIndex + ?Sized,
{
    pub fn new(embedder: Arc<E>, index: Arc<V>, keyword_boost: f64) -> Self {
        Self {
            embedder,
            index,
            keyword_boost: keyword_boost.clamp(0.0, 1.0),
        }
    }

    /// Degraded retrieval for request paths that must never fail: any
    /// embedding or storage error is logged and turned into an empty result
    /// list.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&Metadata>,
    ) -> Vec<SearchResult> {
        match self.try_retrieve(query, top_k, filter).await {
            Ok(results) => results,
            Err(error) => {
                warn!(%error, query, "retrieval failed, returning no results");
                Vec::new()
            }
        }
    }

    /// Fallible retrieval: embed the query, pull an over-fetched candidate
    /// set from the index, re-rank by the fused score, and keep `top_k`.
    pub async fn try_retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|error| SearchError::Embedding(error.to_string()))?;

        // Over-fetch so lexical re-ranking has candidates to promote.
        let candidates = self.index.query(&vector, top_k * 2, filter).await?;

        let query_terms: HashSet<String> = tokenize(query);
        let mut results: Vec<SearchResult> = candidates
            .into_iter()
            .map(|hit| {
                let vector_score = (1.0 - hit.distance).clamp(0.0, 1.0);
                let keyword_score = keyword_overlap(&query_terms, &hit.document);
                let score = (1.0 - self.keyword_boost) * vector_score
                    + self.keyword_boost * keyword_score;
                SearchResult {
                    content: hit.document,
                    metadata: hit.metadata,
                    score,
                    vector_score,
                    keyword_score,
                    id: hit.id,
                }
            })
            .collect();

        results.sort_by(|left, right| right.score.total_cmp(&left.score));
        results.truncate(top_k);

        debug!(query, results = results.len(), "retrieval complete");
        Ok(results)
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(str::to_lowercase)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Fraction of query terms that appear in the document, case-insensitively.
/// 0.0 when the query has no terms.
fn keyword_overlap(query_terms: &HashSet<String>, document: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let document_terms = tokenize(document);
    let shared = query_terms
        .iter()
        .filter(|term| document_terms.contains(*term))
        .count();
    shared as f64 / query_terms.len() as f64
}
