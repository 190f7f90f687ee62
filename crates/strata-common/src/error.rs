use thiserror::Error;

/// Errors surfaced by knowledge base operations.
#[derive(Debug, Error)]
pub enum StrataError {
    /// Caller-supplied input is invalid. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// A sectioning window exhausted its retries; the document is aborted.
    #[error("semantic sectioning failed: {0}")]
    SectioningFailed(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Vector or chunk store failure. After a partial write the caller
    /// triggers a compensating delete and surfaces the original error.
    #[error("store error: {0}")]
    Store(String),

    /// A persisted component record carries a subclass tag this build
    /// does not know how to re-hydrate.
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StrataError>;

/// Error from an LLM, embedding, or rerank provider call.
///
/// The transient/permanent split drives retry policy: transient errors
/// (timeouts, 429s, 5xx) are retried with exponential backoff, permanent
/// errors abort immediately.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("permanent provider error: {0}")]
    Permanent(String),

    /// The provider replied, but the reply did not match the requested
    /// schema. Retried with the invalid reply attached as negative context.
    #[error("schema validation failed: {0}")]
    Schema(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    /// Classify an HTTP status code the way the retry layer expects.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            408 | 429 => ProviderError::Transient(format!("HTTP {status}: {body}")),
            s if s >= 500 => ProviderError::Transient(format!("HTTP {s}: {body}")),
            s => ProviderError::Permanent(format!("HTTP {s}: {body}")),
        }
    }
}
