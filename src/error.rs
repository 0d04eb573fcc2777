//! Error type shared by every core operation.
//!
//! All core functions are pure: a failed call has no output and must be
//! retried by the caller with corrected input.

/// Errors raised by the microstate core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MicrostateError {
    /// Mismatched matrix dimensions or epoch layout.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Not enough samples, channels or GFP peaks to proceed.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// An iterative stage hit its iteration cap without stabilising.
    ///
    /// Never returned by the core itself; produced by `ensure_converged()`
    /// for callers that want the cap to be fatal.
    #[error("{stage} did not converge within {max_iter} iterations")]
    ConvergenceFailure { stage: &'static str, max_iter: usize },

    /// A parameter is outside its valid range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl MicrostateError {
    pub(crate) fn invalid_param(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { name, reason: reason.into() }
    }

    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Self::InvalidShape(msg.into())
    }

    pub(crate) fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MicrostateError>;
