use std::fmt;

/// Errors surfaced synchronously by the engine. A rejected decision is not
/// an error; it comes back as a normal [`Decision`](crate::engine::Decision)
/// carrying a retry hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitError {
    /// The algorithm tag is not one of the five defined algorithms.
    UnknownAlgorithm(String),
    /// A numeric field is missing or non-positive where the chosen
    /// algorithm requires it, or the key is empty.
    InvalidConfig(String),
}

impl fmt::Display for LimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitError::UnknownAlgorithm(tag) => write!(f, "unknown algorithm: {}", tag),
            LimitError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for LimitError {}
