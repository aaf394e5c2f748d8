use std::fmt;
use std::time::Duration;

/// Result type for rate limiting operations
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Errors that can occur during rate limiting operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// Bucket is closed until the reset window elapses
    Closed { bucket: String, reset_after: Duration },

    /// A rate-limit header carried a value that cannot be used
    InvalidHeader { name: &'static str, value: String },
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::Closed { bucket, reset_after } => {
                write!(f, "Bucket {} is rate limited for another {:.3}s", bucket, reset_after.as_secs_f64())
            }
            RateLimitError::InvalidHeader { name, value } => write!(f, "Invalid rate limit header {}: {:?}", name, value),
        }
    }
}

impl std::error::Error for RateLimitError {}
