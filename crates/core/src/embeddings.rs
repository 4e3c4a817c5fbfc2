use crate::config::EmbeddingConfig;
use crate::error::IngestError;
use crate::traits::Embedder;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Client for an OpenAI-compatible embeddings endpoint (the DashScope
/// compatible mode in the default configuration). Stateless; a non-success
/// response is surfaced as `ExternalService` and never retried here.
pub struct HttpEmbedder {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    max_input_chars: usize,
    client: Client,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            max_input_chars: config.max_input_chars,
            client: Client::new(),
        }
    }

    fn check_inputs(&self, texts: &[String]) -> Result<(), IngestError> {
        if texts.is_empty() {
            return Err(IngestError::Validation(
                "embedding input is empty".to_string(),
            ));
        }
        for text in texts {
            let length = text.chars().count();
            if length > self.max_input_chars {
                return Err(IngestError::Validation(format!(
                    "embedding input of {length} chars exceeds the {} char limit",
                    self.max_input_chars
                )));
            }
        }
        Ok(())
    }

    async fn call(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        let payload = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimension,
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::ExternalService(format!(
                "embedding endpoint returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(IngestError::ExternalService(format!(
                "embedding endpoint returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        let mut entries = parsed.data;
        entries.sort_by_key(|entry| entry.index);

        for entry in &entries {
            if entry.embedding.len() != self.dimension {
                return Err(IngestError::ExternalService(format!(
                    "embedding dimension {} does not match configured {}",
                    entry.embedding.len(),
                    self.dimension
                )));
            }
        }

        Ok(entries.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        let inputs = [text.to_string()];
        self.check_inputs(&inputs)?;
        let mut vectors = self.call(&inputs).await?;
        Ok(vectors.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        self.check_inputs(texts)?;
        self.call(texts).await
    }
}

pub const HASH_EMBEDDER_DIMENSION: usize = 256;

/// Deterministic character-trigram embedder for offline use and tests.
/// Identical text always embeds to the identical unit vector, so an
/// exact-text query has distance zero to its record.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    pub dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimension: HASH_EMBEDDER_DIMENSION,
        }
    }
}

impl HashEmbedder {
    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        if chars.len() < 3 {
            let token: String = chars.iter().collect();
            let bucket = (fnv1a(token.as_bytes()) % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let bucket = (fnv1a(token.as_bytes()) % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 1469598103934665603u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "local-ngram-v1"
    }

    fn max_input_chars(&self) -> usize {
        crate::config::DEFAULT_MAX_INPUT_CHARS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        Ok(texts.iter().map(|text| self.embed_sync(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::default();
        let first = embedder.embed("linear algebra review").await.expect("embed");
        let second = embedder.embed("linear algebra review").await.expect("embed");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn hash_embedder_outputs_unit_vectors() {
        let embedder = HashEmbedder { dimension: 32 };
        let vector = embedder.embed("abc def").await.expect("embed");
        assert_eq!(vector.len(), 32);
        let magnitude: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn batch_order_matches_input_order() {
        let embedder = HashEmbedder::default();
        let texts = vec!["one".to_string(), "two".to_string()];
        let batch = embedder.embed_batch(&texts).await.expect("embed");
        assert_eq!(batch[0], embedder.embed("one").await.expect("embed"));
        assert_eq!(batch[1], embedder.embed("two").await.expect("embed"));
    }

    #[tokio::test]
    async fn oversized_input_is_rejected_before_any_network_call() {
        let config = EmbeddingConfig {
            max_input_chars: 8,
            ..EmbeddingConfig::default()
        };
        let embedder = HttpEmbedder::new(&config);
        let result = embedder.embed("far too long for the limit").await;
        assert!(matches!(result, Err(IngestError::Validation(_))));
    }
}
