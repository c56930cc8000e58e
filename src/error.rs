//! Error taxonomy for the report engine.
//!
//! Every fallible boundary in the engine (token acquisition, GraphQL
//! transport, pagination, job admission) surfaces through [`EngineError`].
//! Callers match on the variant to decide whether a retry is safe.

use std::time::Duration;
use thiserror::Error;

/// Top-level error type returned by every public engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid report code, unknown analyzer id, or a config value outside
    /// its documented range (e.g. an early-mass window outside `[1, 15]`).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The upstream identity endpoint rejected the configured credentials.
    /// Non-retryable.
    #[error("unauthorized: upstream rejected client credentials")]
    Unauthorized,

    /// Network failure or HTTP 5xx that survived the retry budget.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Persistent HTTP 429 after retries exhausted.
    #[error("rate limited by upstream, retry after {retry_after:?}")]
    RateLimited {
        /// Hint taken from the upstream `Retry-After` header, if present.
        retry_after: Option<Duration>,
    },

    /// The GraphQL response's `errors` array was non-empty.
    #[error("upstream query error at {path}: {message}")]
    UpstreamQueryError {
        /// The first error's message.
        message: String,
        /// Dotted GraphQL path of the first error, or "<unknown>".
        path: String,
    },

    /// Event paging detected a `nextPageTimestamp` that stopped advancing.
    #[error("pagination stalled after {observations} identical cursors")]
    PaginationStalled {
        /// Number of identical cursor observations that triggered the abort.
        observations: u32,
    },

    /// The upstream `reportData.report` resolved to `null`.
    #[error("report not found: {0}")]
    ReportNotFound(String),

    /// A job was canceled by an operator before it completed.
    #[error("job canceled")]
    Canceled,

    /// A job or request exceeded its wall-clock budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Any lower-level failure that doesn't fit the taxonomy above
    /// (serialization bugs, internal invariant violations). Kept narrow on
    /// purpose — new call sites should add a proper variant instead of
    /// reaching for this one.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether retrying the exact same request is safe and may succeed.
    ///
    /// Nothing stops a consumer from retrying any variant, but this helps
    /// avoid busy-looping on errors that will never resolve on their own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::UpstreamUnavailable(_) | EngineError::RateLimited { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
