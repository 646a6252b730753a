//! Error types for chain primitives

use thiserror::Error;

/// Errors parsing fixed-size chain primitives
#[derive(Error, Debug)]
pub enum StateError {
    /// Malformed hex string for a fixed-size value
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Byte slice of the wrong length for a fixed-size value
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Result type for state operations
pub type StateResult<T> = Result<T, StateError>;
