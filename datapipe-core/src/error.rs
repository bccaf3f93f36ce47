//! Error types for pipeline construction and iteration

use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for pipeline operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Dimension mismatch: slicing a scalar, inconsistent element shapes
    /// within a batch, or tuple components disagreeing on a leading dimension
    #[error("Shape error: {0}")]
    Shape(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A repeated pipeline turned out to produce no elements at all
    #[error("Empty source: {0}")]
    EmptySource(String),
}

impl Error {
    /// Shorthand for a [`Error::Shape`] with a formatted message
    pub fn shape(msg: impl Into<String>) -> Self {
        Error::Shape(msg.into())
    }

    /// Shorthand for a [`Error::InvalidArgument`] with a formatted message
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
