//! Error taxonomy for the base station diagnostic core.
//!
//! Variants map 1:1 onto the error classes the core distinguishes in its
//! propagation policy: some are recoverable locally and never surface past
//! the component that raised them (`Protocol`, `DataInsufficient`,
//! `PolicyDenied`), others are terminal outcomes of a user-initiated call.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Bad header, oversize length, or CRC mismatch. Discarded and counted
    /// at the frame codec; never propagated above the device session.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Reading or request failed a range/unit/enum check.
    #[error("validation error: {0}")]
    Validation(String),

    /// An analyzer was asked to run with fewer samples than its minimum.
    /// Not an error condition for callers: treated as "no result yet".
    #[error("insufficient data: have {have}, need {need}")]
    DataInsufficient { have: usize, need: usize },

    /// A network read/write or an action execution exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// An action's risk exceeds what auto-execute policy allows; the action
    /// remains PENDING rather than failing.
    #[error("policy denied: risk {risk} requires approval")]
    PolicyDenied { risk: String },

    /// A healing action's handler reported failure.
    #[error("execution failed: {0}")]
    ExecutionFailure(String),

    /// Request referenced an id that does not exist (action, alarm, station).
    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invariant violation or other unexpected internal condition.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    /// True only for errors where a retry is plausibly safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Timeout(_))
    }

    /// Stable label for metrics and log fields.
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::Protocol(_) => "protocol",
            CoreError::Validation(_) => "validation",
            CoreError::DataInsufficient { .. } => "data_insufficient",
            CoreError::Timeout(_) => "timeout",
            CoreError::PolicyDenied { .. } => "policy_denied",
            CoreError::ExecutionFailure(_) => "execution_failure",
            CoreError::NotFound(_) => "not_found",
            CoreError::Serialization(_) => "serialization",
            CoreError::Configuration(_) => "configuration",
            CoreError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeout_is_retryable() {
        assert!(CoreError::Timeout(std::time::Duration::from_secs(1)).is_retryable());
        assert!(!CoreError::Validation("x".into()).is_retryable());
        assert!(!CoreError::DataInsufficient { have: 1, need: 30 }.is_retryable());
    }

    #[test]
    fn categories_are_stable_labels() {
        assert_eq!(CoreError::Protocol("x".into()).category(), "protocol");
        assert_eq!(
            CoreError::PolicyDenied { risk: "HIGH".into() }.category(),
            "policy_denied"
        );
    }
}
