//! Error types for doccheck.
//!
//! Callers see four failure classes from an authenticated call
//! (`Unauthenticated`, `SessionExpired`, `Server`, `Network`) plus the
//! local failures of the credential store and input validation.

use std::fmt;
use thiserror::Error;

/// The unified error type for doccheck operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A protected endpoint was called with no credentials at all.
    #[error("not authenticated, log in first")]
    Unauthenticated,

    /// The refresh token was rejected; the session has been cleared.
    #[error("session expired, log in again")]
    SessionExpired,

    /// The server answered with a non-success status.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// No response was obtained (DNS, TLS, connection, timeout, decode).
    #[error("network error: {0}")]
    Network(#[from] TransportError),

    /// The credential store could not be read or written.
    #[error("credential store error: {0}")]
    Store(#[from] StoreError),

    /// Input validation errors (base URL, endpoint paths).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),
}

impl Error {
    /// Whether the caller should send the user back to the login screen.
    pub fn requires_login(&self) -> bool {
        matches!(self, Error::Unauthenticated | Error::SessionExpired)
    }

    /// HTTP status of a server error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Server(err) => Some(err.status),
            _ => None,
        }
    }
}

/// Transport-level errors.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// Response body could not be decoded.
    #[error("malformed response: {message}")]
    Decode { message: String },

    /// A refresh this call was waiting on never settled.
    #[error("token refresh abandoned")]
    RefreshAbandoned,

    /// Generic HTTP error.
    #[error("HTTP error: {message}")]
    Http { message: String },
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connection {
                message: err.to_string(),
            }
        } else if err.is_decode() {
            TransportError::Decode {
                message: err.to_string(),
            }
        } else {
            TransportError::Http {
                message: err.to_string(),
            }
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(TransportError::from(err))
    }
}

/// A non-success response reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// HTTP status code.
    pub status: u16,
    /// The `detail` field of the error body, when present.
    pub message: Option<String>,
}

impl ServerError {
    /// Create a new server error.
    pub fn new(status: u16, message: Option<String>) -> Self {
        Self { status, message }
    }

    /// Check if this is an authorization failure.
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message {
            Some(ref message) => write!(f, "HTTP {}: {}", self.status, message),
            None => write!(f, "HTTP {}", self.status),
        }
    }
}

impl std::error::Error for ServerError {}

/// Credential store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data could not be parsed.
    #[error("corrupt store data: {message}")]
    Corrupt { message: String },

    /// The store's lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt {
            message: err.to_string(),
        }
    }
}

/// Input validation errors.
#[derive(Debug, Error)]
pub enum InvalidInputError {
    /// Invalid API base URL.
    #[error("invalid API URL '{value}': {reason}")]
    ApiUrl { value: String, reason: String },

    /// Invalid endpoint path.
    #[error("invalid endpoint '{value}': {reason}")]
    Endpoint { value: String, reason: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}
