use std::fmt;

/// Result type for traceherd-client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur at the provider boundary
#[derive(Debug)]
pub enum Error {
    /// Credential missing locally or rejected by the provider (401)
    Authentication(String),

    /// Session id unknown to the provider (404)
    SessionNotFound(String),

    /// Any other non-2xx provider response
    Api { status: u16, detail: String },

    /// Transport-level failure (connect, timeout, body decode)
    Http(reqwest::Error),

    /// Client-side configuration problem
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Authentication(msg) => write!(f, "Authentication error: {}", msg),
            Error::SessionNotFound(msg) => write!(f, "Session not found: {}", msg),
            Error::Api { status, detail } => write!(f, "API error (HTTP {}): {}", status, detail),
            Error::Http(err) => write!(f, "HTTP error: {}", err),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}
