use thiserror::Error;

use crate::domain::quote::QuoteStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid quote transition from {from:?} to {to:?}")]
    InvalidQuoteTransition { from: QuoteStatus, to: QuoteStatus },
    #[error("unknown quote status `{0}`")]
    UnknownQuoteStatus(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}
