use thiserror::Error;

#[derive(Error, Debug)]
pub enum IterationError {
    #[error("Invalid argument: element {element} outside domain [0, {size})")]
    ElementOutOfRange {
        element: usize,
        size: usize,
    },

    #[error("Invalid argument: negative iteration count {0}")]
    NegativeSteps(i64),

    #[error("Domain error: f({index}) = {image} outside codomain [0, {size})")]
    DomainError {
        index: usize,
        image: usize,
        size: usize,
    },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Parse error: token {position} ({token:?}) is not a domain element")]
    Parse {
        position: usize,
        token: String,
    },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IterationError {
    /// True for the caller-side argument errors (element outside the domain,
    /// negative step count).
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            IterationError::ElementOutOfRange { .. } | IterationError::NegativeSteps(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IterationError>;
