use std::time::Duration;
use thiserror::Error;

/// How a call to the reasoning service failed. The gateway turns every
/// variant into a synthetic result; none of them reach the loop.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InferenceError::Timeout(Duration::ZERO)
        } else {
            InferenceError::Other(err.to_string())
        }
    }
}
