//! Embedding provider.
//!
//! `OpenAiCompatEmbedding` calls any `/v1/embeddings` endpoint. Vectors
//! are L2-normalized on receipt so the vector store can use inner product
//! as cosine similarity.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use strata_common::{ComponentRecord, InputType, ProviderError, StrataError};

#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed `texts` in order; returns one vector per input.
    async fn embed(
        &self,
        texts: &[String],
        input_type: InputType,
    ) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Stable output dimensionality.
    fn dimension(&self) -> usize;

    fn to_record(&self) -> ComponentRecord;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            base_url: None,
            api_key: None,
        }
    }
}

/// Embedding client for OpenAI-compatible endpoints.
pub struct OpenAiCompatEmbedding {
    cfg: EmbeddingConfig,
    client: Client,
}

impl OpenAiCompatEmbedding {
    pub fn new(cfg: EmbeddingConfig) -> Self {
        Self { cfg, client: Client::new() }
    }

    fn endpoint(&self) -> String {
        let base = self
            .cfg
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com")
            .trim_end_matches('/');
        format!("{base}/v1/embeddings")
    }

    fn resolve_key(&self) -> String {
        self.cfg
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default()
    }

    async fn send_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = json!({
            "model": &self.cfg.model,
            "input": texts,
        });
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.resolve_key())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(ProviderError::from_status(status, text));
        }

        let reply: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Permanent(format!("malformed embeddings body: {e}")))?;
        let data = reply["data"]
            .as_array()
            .ok_or_else(|| ProviderError::Permanent("embeddings reply has no data".into()))?;
        if data.len() != texts.len() {
            return Err(ProviderError::Permanent(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }

        let mut vectors = Vec::with_capacity(data.len());
        for entry in data {
            let mut vector: Vec<f32> = entry["embedding"]
                .as_array()
                .ok_or_else(|| ProviderError::Permanent("embedding entry is not an array".into()))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            l2_normalize(&mut vector);
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiCompatEmbedding {
    async fn embed(
        &self,
        texts: &[String],
        _input_type: InputType,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .build();

        backoff::future::retry(policy, || async move {
            self.send_once(texts).await.map_err(|e| {
                if e.is_transient() {
                    warn!(model = %self.cfg.model, error = %e, "transient embedding error, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }

    fn dimension(&self) -> usize {
        self.cfg.dimension
    }

    fn to_record(&self) -> ComponentRecord {
        ComponentRecord::new(
            "OpenAiCompatEmbedding",
            serde_json::to_value(&self.cfg).unwrap_or(Value::Null),
        )
    }
}

/// Scale a vector to unit length. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Re-hydrate an embedding model from a persisted record.
pub fn from_record(record: &ComponentRecord) -> Result<Arc<dyn EmbeddingModel>, StrataError> {
    match record.subclass_name.as_str() {
        "OpenAiCompatEmbedding" => {
            let cfg: EmbeddingConfig = serde_json::from_value(record.params.clone())?;
            Ok(Arc::new(OpenAiCompatEmbedding::new(cfg)))
        }
        other => Err(StrataError::UnknownComponent(format!("embedding model `{other}`"))),
    }
}
