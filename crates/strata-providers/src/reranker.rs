//! Rerank provider.
//!
//! `ApiReranker` calls a Cohere-compatible `/v1/rerank` endpoint with the
//! hit texts carried on the ranked results. `NoopReranker` passes search
//! order through unchanged, for offline use and tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use strata_common::{ComponentRecord, ProviderError, RankedResult, StrataError};

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Re-score `results` against `query`. Output similarities are in
    /// [0, 1], sorted descending.
    async fn rerank(
        &self,
        query: &str,
        results: Vec<RankedResult>,
    ) -> Result<Vec<RankedResult>, ProviderError>;

    fn to_record(&self) -> ComponentRecord;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            model: "rerank-v3.5".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

/// Client for Cohere-compatible rerank endpoints.
pub struct ApiReranker {
    cfg: RerankConfig,
    client: Client,
}

impl ApiReranker {
    pub fn new(cfg: RerankConfig) -> Self {
        Self { cfg, client: Client::new() }
    }

    fn endpoint(&self) -> String {
        let base = self
            .cfg
            .base_url
            .as_deref()
            .unwrap_or("https://api.cohere.com")
            .trim_end_matches('/');
        format!("{base}/v1/rerank")
    }

    fn resolve_key(&self) -> String {
        self.cfg
            .api_key
            .clone()
            .or_else(|| std::env::var("COHERE_API_KEY").ok())
            .unwrap_or_default()
    }

    async fn send_once(
        &self,
        query: &str,
        results: &[RankedResult],
    ) -> Result<Vec<RankedResult>, ProviderError> {
        let documents: Vec<&str> = results
            .iter()
            .map(|r| r.text.as_deref().unwrap_or(""))
            .collect();
        let body = json!({
            "model": &self.cfg.model,
            "query": query,
            "documents": documents,
            "top_n": documents.len(),
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
            .map_err(|e| ProviderError::Permanent(format!("malformed rerank body: {e}")))?;
        let entries = reply["results"]
            .as_array()
            .ok_or_else(|| ProviderError::Permanent("rerank reply has no results".into()))?;

        let mut reranked = Vec::with_capacity(entries.len());
        for entry in entries {
            let index = entry["index"]
                .as_u64()
                .ok_or_else(|| ProviderError::Permanent("rerank entry has no index".into()))?
                as usize;
            let score = entry["relevance_score"].as_f64().unwrap_or(0.0) as f32;
            let original = results
                .get(index)
                .ok_or_else(|| ProviderError::Permanent("rerank index out of range".into()))?;
            reranked.push(RankedResult {
                similarity: score.clamp(0.0, 1.0),
                ..original.clone()
            });
        }
        reranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        Ok(reranked)
    }
}

#[async_trait]
impl Reranker for ApiReranker {
    async fn rerank(
        &self,
        query: &str,
        results: Vec<RankedResult>,
    ) -> Result<Vec<RankedResult>, ProviderError> {
        if results.is_empty() {
            return Ok(results);
        }
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .build();

        let results = &results;
        backoff::future::retry(policy, || async move {
            self.send_once(query, results).await.map_err(|e| {
                if e.is_transient() {
                    warn!(model = %self.cfg.model, error = %e, "transient rerank error, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }

    fn to_record(&self) -> ComponentRecord {
        ComponentRecord::new(
            "ApiReranker",
            serde_json::to_value(&self.cfg).unwrap_or(Value::Null),
        )
    }
}

/// Pass-through reranker: keeps vector-search order, clamping
/// similarities into [0, 1].
#[derive(Debug, Default, Clone)]
pub struct NoopReranker;

#[async_trait]
impl Reranker for NoopReranker {
    async fn rerank(
        &self,
        _query: &str,
        mut results: Vec<RankedResult>,
    ) -> Result<Vec<RankedResult>, ProviderError> {
        for r in results.iter_mut() {
            r.similarity = r.similarity.clamp(0.0, 1.0);
        }
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        Ok(results)
    }

    fn to_record(&self) -> ComponentRecord {
        ComponentRecord::new("NoopReranker", Value::Null)
    }
}

/// Re-hydrate a reranker from a persisted record.
pub fn from_record(record: &ComponentRecord) -> Result<Arc<dyn Reranker>, StrataError> {
    match record.subclass_name.as_str() {
        "ApiReranker" => {
            let cfg: RerankConfig = serde_json::from_value(record.params.clone())?;
            Ok(Arc::new(ApiReranker::new(cfg)))
        }
        "NoopReranker" => Ok(Arc::new(NoopReranker)),
        other => Err(StrataError::UnknownComponent(format!("reranker `{other}`"))),
    }
}
