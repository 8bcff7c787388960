//! Errors raised by the external collaborators.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectError {
    /// Content-addressed store failure, including integrity violations.
    #[error("CAS error: {0}")]
    Cas(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The HTTP client could not be built or a request could not be sent.
    #[error("HTTP error for {endpoint}: {reason}")]
    Http { endpoint: String, reason: String },
}
