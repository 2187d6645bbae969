use std::fmt;

/// Result type for traceherd-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the engine layer
#[derive(Debug)]
pub enum Error {
    /// Date string matched none of the accepted formats
    InvalidDate(String),

    /// A single-session bundle resolved to no session
    SessionNotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidDate(input) => write!(
                f,
                "Invalid date format: {}. Use YYYY-MM-DD or YYYY-MM-DD HH:MM:SS",
                input
            ),
            Error::SessionNotFound(msg) => write!(f, "Session not found: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
