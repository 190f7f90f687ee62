//! Structured-completion LLM provider.
//!
//! One implementation is provided: `OpenAiCompatChat`, which talks to any
//! OpenAI-compatible `/v1/chat/completions` endpoint (OpenAI, Groq,
//! Together, Ollama, vLLM, …) in JSON mode. The requested reply schema is
//! embedded in the system message; the reply is parsed as JSON and handed
//! back to the caller for domain validation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use strata_common::{ComponentRecord, ProviderError, StrataError};

/// Structured LLM completion.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete `prompt`, requesting a JSON reply matching `schema`.
    ///
    /// Transient transport failures are retried internally with
    /// exponential backoff; the error returned here is final from the
    /// transport's point of view.
    async fn complete(&self, prompt: &str, schema: &Value) -> Result<Value, ProviderError>;

    fn to_record(&self) -> ComponentRecord;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    /// Endpoint base, e.g. `https://api.openai.com`. Defaults to OpenAI.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Never serialized; resolved from the environment on re-hydration.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 { 4000 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.0,
            max_tokens: default_max_tokens(),
        }
    }
}

/// Chat client for OpenAI-compatible endpoints, JSON mode.
pub struct OpenAiCompatChat {
    cfg: LlmConfig,
    client: Client,
}

impl OpenAiCompatChat {
    pub fn new(cfg: LlmConfig) -> Self {
        Self { cfg, client: Client::new() }
    }

    fn endpoint(&self) -> String {
        let base = self
            .cfg
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com")
            .trim_end_matches('/');
        format!("{base}/v1/chat/completions")
    }

    fn resolve_key(&self) -> String {
        self.cfg
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default()
    }

    async fn send_once(&self, prompt: &str, schema: &Value) -> Result<Value, ProviderError> {
        let system = format!(
            "You are a document analysis assistant. Reply with a single JSON object \
             matching this JSON schema, and nothing else:\n{schema}"
        );
        let body = json!({
            "model": &self.cfg.model,
            "temperature": self.cfg.temperature,
            "max_tokens": self.cfg.max_tokens,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
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
            .map_err(|e| ProviderError::Permanent(format!("malformed completion body: {e}")))?;
        let content = reply["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Permanent("completion reply has no content".into()))?;

        serde_json::from_str(content)
            .map_err(|e| ProviderError::Schema(format!("reply is not valid JSON: {e}")))
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatChat {
    async fn complete(&self, prompt: &str, schema: &Value) -> Result<Value, ProviderError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .build();

        backoff::future::retry(policy, || async move {
            self.send_once(prompt, schema).await.map_err(|e| {
                if e.is_transient() {
                    warn!(model = %self.cfg.model, error = %e, "transient LLM error, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
        .map(|v| {
            debug!(model = %self.cfg.model, "completion ok");
            v
        })
    }

    fn to_record(&self) -> ComponentRecord {
        ComponentRecord::new(
            "OpenAiCompatChat",
            serde_json::to_value(&self.cfg).unwrap_or(Value::Null),
        )
    }
}

/// Re-hydrate an LLM provider from a persisted record.
pub fn from_record(record: &ComponentRecord) -> Result<Arc<dyn LlmProvider>, StrataError> {
    match record.subclass_name.as_str() {
        "OpenAiCompatChat" => {
            let cfg: LlmConfig = serde_json::from_value(record.params.clone())?;
            Ok(Arc::new(OpenAiCompatChat::new(cfg)))
        }
        other => Err(StrataError::UnknownComponent(format!("llm provider `{other}`"))),
    }
}
