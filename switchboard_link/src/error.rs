use thiserror::Error;

/// An error produced while framing a byte stream into lines.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    #[error("Line exceeds maximum length")]
    Overflow,
    #[error("Line is not valid utf-8")]
    InvalidUtf8,
}

/// An error that might occur on a single connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection closed")]
    Closed,
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Line exceeds maximum length")]
    LineTooLong,
    #[error("Line is not valid utf-8")]
    InvalidUtf8,
}

/// An error that might occur when setting up the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<std::io::Error> for ConnectionError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

impl From<LineError> for ConnectionError {
    fn from(e: LineError) -> Self {
        match e {
            LineError::Overflow => Self::LineTooLong,
            LineError::InvalidUtf8 => Self::InvalidUtf8,
        }
    }
}
