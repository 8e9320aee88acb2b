use thiserror::Error;

/// Failure reported by an interaction store or product catalog.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store returned undecodable data: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("limit must be greater than zero")]
    InvalidLimit,
    #[error("{name} weights must sum to 1.0 (got {sum})")]
    InvalidWeights { name: &'static str, sum: f64 },
    #[error("season month {month} for category `{category}` is outside 1..=12")]
    InvalidSeasonMonth { category: String, month: u32 },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(StoreError::Unavailable(_)))
    }
}
