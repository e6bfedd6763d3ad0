use thiserror::Error;

/// Errors produced while parsing a Common Log Format line
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line does not have the Common Log Format shape
    #[error("malformed log line: {line:?}")]
    Malformed {
        /// The offending line
        line: String,
    },

    /// The bracketed timestamp could not be decoded
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// Raw timestamp text
        value: String,
        /// Decoder message
        reason: String,
    },

    /// Status code is not a valid HTTP status
    #[error("invalid status code {0:?}")]
    InvalidStatus(String),

    /// Response size is neither `-` nor an unsigned integer
    #[error("invalid response size {0:?}")]
    InvalidSize(String),
}
