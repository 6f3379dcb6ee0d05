use thiserror::Error;

/// Failures raised while turning a queued opportunity into a persisted analysis.
///
/// None of these crash the worker loop: the worker logs them and moves on to
/// the next message.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("AI response was empty")]
    EmptyResponse,

    #[error("no JSON object found in AI response")]
    NoJsonBlock,

    #[error("AI response JSON could not be repaired: {source}")]
    UnrepairableJson {
        #[source]
        source: serde_json::Error,
        /// The `{ ... }` slice that failed to decode, before repair.
        extracted: String,
    },

    #[error("AI call failed: {0}")]
    TransientAi(String),

    /// The provider refused the request itself (bad key, malformed request).
    #[error("AI request rejected: {0}")]
    RejectedAi(String),

    #[error("missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("notification delivery failed: {0}")]
    SinkDelivery(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Only timeouts, transport failures, rate limits and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::TransientAi(_))
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        AnalysisError::TransientAi(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
