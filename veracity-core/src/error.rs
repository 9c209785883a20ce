//! Error types for the veracity-core crate.

use thiserror::Error;

/// Top-level error type for explanation and uncertainty operations.
///
/// Every analysis stage except the initial encode/inference is optional: the
/// analyzer catches `AttributionUnavailable`, `AttentionUnavailable` and
/// `UncertaintyUnavailable` at the stage boundary and omits the field.
#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("Attribution unavailable: {0}")]
    AttributionUnavailable(String),

    #[error("Attention output unavailable: {0}")]
    AttentionUnavailable(String),

    #[error("Uncertainty unavailable: {0}")]
    UncertaintyUnavailable(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    InvalidShape { expected: String, actual: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ExplainError {
    pub fn attribution(msg: impl Into<String>) -> Self {
        Self::AttributionUnavailable(msg.into())
    }

    pub fn attention(msg: impl Into<String>) -> Self {
        Self::AttentionUnavailable(msg.into())
    }

    pub fn uncertainty(msg: impl Into<String>) -> Self {
        Self::UncertaintyUnavailable(msg.into())
    }

    pub fn empty_input(msg: impl Into<String>) -> Self {
        Self::EmptyInput(msg.into())
    }

    pub fn shape(expected: impl ToString, actual: impl ToString) -> Self {
        Self::InvalidShape {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error only disables one optional output field.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AttributionUnavailable(_)
                | Self::AttentionUnavailable(_)
                | Self::UncertaintyUnavailable(_)
        )
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, ExplainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(ExplainError::attribution("no grad").is_recoverable());
        assert!(ExplainError::uncertainty("no dropout").is_recoverable());
        assert!(ExplainError::attention("no attn").is_recoverable());
        assert!(!ExplainError::empty_input("nothing").is_recoverable());
        assert!(!ExplainError::model("boom").is_recoverable());
    }

    #[test]
    fn test_shape_message() {
        let err = ExplainError::shape("7 positions", 5);
        assert_eq!(
            err.to_string(),
            "Invalid shape: expected 7 positions, got 5"
        );
    }
}
