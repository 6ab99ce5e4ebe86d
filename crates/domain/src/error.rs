/// Shared error type used across all policy-engine crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    /// Bad rule file: parse failure or a rule that fails validation.
    /// Aborts a load; a reload leaves the prior snapshot active.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Malformed tool request (bad tool_name, missing fields, ...).
    #[error("parameter validation failed: {0}")]
    ParameterValidation(String),

    /// A predicate raised during evaluation. Always swallowed by the
    /// pattern engine (treated as `false`) — surfaced here only for logging.
    #[error("rule evaluation failed: {0}")]
    RuleEvaluationFailed(String),

    /// All inference providers failed, or the circuit is open.
    #[error("AI service unavailable: {0}")]
    AIServiceUnavailable(String),

    /// The inference deadline was hit.
    #[error("AI service timeout: {0}")]
    AIServiceTimeout(String),

    /// The circuit breaker rejected the call without reaching the provider.
    #[error("circuit open: {0}")]
    CircuitOpen(String),

    /// Request queue is full and backpressure is enabled.
    #[error("queue full")]
    QueueFull,

    /// Request queue accepted the item but it waited past its enqueue timeout.
    #[error("enqueue timeout")]
    EnqueueTimeout,

    /// Item expired while waiting in the queue (distinct from `EnqueueTimeout`,
    /// which is the backpressure-wait timeout at enqueue time).
    #[error("timeout in queue")]
    TimeoutInQueue,

    /// Item was still queued when the queue was shut down.
    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error should resolve to an `AIServiceUnavailable` per
    /// the error taxonomy (§7): circuit-open and backpressure causes are
    /// all folded into the same fail-open policy.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::AIServiceUnavailable(_)
                | Error::CircuitOpen(_)
                | Error::QueueFull
                | Error::EnqueueTimeout
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
