//! Error types for the analysis engine.
//!
//! Three layers of failure are distinguished: the reasoning service
//! (per call), document extraction (per document, recoverable) and the
//! analysis run as a whole.

use thiserror::Error;

/// Failure reported by the external reasoning service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReasoningError {
    /// The request was rejected as malformed (bad model, oversized prompt, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Credentials were missing or rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The service asked us to slow down.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Timeouts, connection resets, 5xx responses and anything unclassified.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl ReasoningError {
    /// Whether retrying the same request can possibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReasoningError::RateLimited(_) | ReasoningError::Transient(_)
        )
    }
}

/// Failure to turn a document handle into plain text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("failed to extract text from {document}: {reason}")]
    ExtractionFailed { document: String, reason: String },
}

/// Failure of an analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Rejected before any external call was made.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A question evaluation failed fatally; no partial index is returned.
    #[error("evaluating '{question}' against {document} failed: {source}")]
    Reasoning {
        document: String,
        question: String,
        #[source]
        source: ReasoningError,
    },

    /// The caller cancelled the run; partial aggregates were discarded.
    #[error("analysis cancelled")]
    Cancelled,

    /// The fold finished without an outcome for every (document, question) pair.
    #[error("analysis incomplete: {0}")]
    Incomplete(String),
}
