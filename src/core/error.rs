use thiserror::Error;

/// Failures that abort an engine run before any result is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("arithmetic overflow while computing {context}")]
    ArithmeticOverflow { context: &'static str },
}

impl EngineError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        EngineError::InvalidParameters {
            reason: reason.into(),
        }
    }

    pub(crate) fn overflow(context: &'static str) -> Self {
        EngineError::ArithmeticOverflow { context }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
