//! Common error types for Warden components.

use thiserror::Error;

/// Common errors across Warden components
#[derive(Debug, Error)]
pub enum WardenError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A startup invariant does not hold (missing role or channel)
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Membership directory call failed
    #[error("Directory error: {0}")]
    Directory(String),

    /// Challenge generation error
    #[error("Challenge error: {0}")]
    Challenge(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::Invariant(_) => 500,
            Self::Directory(_) => 502,
            Self::Challenge(_) => 500,
            Self::InvalidInput(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Directory(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(WardenError::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(WardenError::Directory("x".into()).status_code(), 502);
        assert!(WardenError::Directory("x".into()).is_retryable());
        assert!(!WardenError::Invariant("x".into()).is_retryable());
    }
}
