//! Job queue error types.

use thiserror::Error;

/// Result type for job queue operations.
pub type JobResult<T> = Result<T, JobError>;

/// Errors surfaced by the job queue.
#[derive(Debug, Error)]
pub enum JobError {
    /// The calling context was cancelled or its deadline expired. Not
    /// counted against the circuit breaker.
    #[error("operation cancelled")]
    Cancelled,

    /// The requested key was absent (Redis nil). Treated as an empty
    /// result, not a failure. Not counted against the circuit breaker.
    #[error("not found: {0}")]
    NotFound(String),

    /// The circuit breaker rejected the call.
    #[error("circuit breaker open: {0}")]
    CircuitOpen(String),

    /// A connection-shaped failure: refused, timed out, broken pipe, DNS
    /// failure, or any other OS-level networking error. Counted against
    /// the circuit breaker.
    #[error("network error: {0}")]
    Network(String),

    /// Neither the job message shape nor the outbox envelope shape could
    /// decode the payload. Logged and dropped; not retried.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A signing credential (public key or signature) was the wrong
    /// length or not valid base64.
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    /// A descriptor's signature did not verify.
    #[error("signature invalid")]
    SignatureInvalid,

    /// The caller-supplied handler returned an error while processing a
    /// job.
    #[error("handler error: {0}")]
    HandlerError(String),

    /// The stats pipeline could not be completed.
    #[error("stats unavailable: {0}")]
    StatsUnavailable(String),

    /// Redis command error not otherwise classified.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis connection pool error.
    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// The payload was not valid JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for errors that don't fit the above kinds.
    #[error("{0}")]
    Other(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Classifies a raw [`redis::RedisError`] into the appropriate
    /// `JobError` kind, distinguishing connection-shaped failures from
    /// other command errors.
    pub fn from_redis(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            JobError::Network(err.to_string())
        } else if err.kind() == redis::ErrorKind::TypeError && err.to_string().contains("Response was nil") {
            JobError::NotFound(err.to_string())
        } else {
            JobError::Redis(err)
        }
    }

    /// Whether a failed dequeue/processing attempt should be retried by
    /// the caller rather than surfaced as a terminal error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobError::Network(_) | JobError::CircuitOpen(_) | JobError::Redis(_) | JobError::Pool(_)
        )
    }

    /// Whether this error should count against the circuit breaker that
    /// wraps the Redis primitives. Cancellation and not-found are
    /// expected outcomes and must not trip the breaker.
    pub fn counts_as_circuit_failure(&self) -> bool {
        !matches!(self, JobError::Cancelled | JobError::NotFound(_) | JobError::CircuitOpen(_))
    }
}

impl From<arcana_crypto::CryptoError> for JobError {
    fn from(err: arcana_crypto::CryptoError) -> Self {
        match err {
            arcana_crypto::CryptoError::MalformedCredential(msg) => JobError::MalformedCredential(msg),
            arcana_crypto::CryptoError::SignatureInvalid => JobError::SignatureInvalid,
            other => JobError::Other(other.to_string()),
        }
    }
}

impl From<arcana_resilience::CircuitBreakerError<JobError>> for JobError {
    fn from(err: arcana_resilience::CircuitBreakerError<JobError>) -> Self {
        match err {
            arcana_resilience::CircuitBreakerError::Open(name) => JobError::CircuitOpen(name),
            arcana_resilience::CircuitBreakerError::Failure(e) => e,
        }
    }
}
