//! Typed error taxonomy for the oracle boundary.
//!
//! Every collaborator failure is converted to one of these kinds before it
//! crosses into orchestration code. Quality exhaustion and repair budget
//! trips are loop outcomes, not errors, and never appear here.

use thiserror::Error;

/// Failure kinds an oracle call can surface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    /// Missing credentials or configuration. Permanent for the run: the
    /// caller switches to local fallback content, no retry.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// Rate limited or overloaded. Retried with backoff, then the next tier
    /// in the fallback chain.
    #[error("oracle transient failure: {0}")]
    Transient(String),

    /// Output arrived but could not be used as-is. Triggers a normalization
    /// pass or substitution with a minimal safe default.
    #[error("malformed oracle output: {0}")]
    Malformed(String),
}

impl OracleError {
    pub fn is_transient(&self) -> bool {
        matches!(self, OracleError::Transient(_))
    }
}
