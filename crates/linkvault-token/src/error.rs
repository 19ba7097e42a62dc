use thiserror::Error;

/// Errors returned by token source construction and validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token length {length}; expected {min}..={max}")]
    InvalidLength { length: usize, min: usize, max: usize },
    #[error("wrong token length: expected {expected}, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("wrong token alphabet: '{0}'")]
    WrongAlphabet(String),
}
