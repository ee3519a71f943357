//! Error types.

use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Login input failed local checks; no request was sent.
    #[error("{0}")]
    Validation(String),

    /// The backend rejected the credentials. The message is already safe to display.
    #[error("{0}")]
    Credentials(String),

    /// Too many rejected logins; blocked locally until the cooldown passes.
    #[error("Too many failed attempts. Please wait a few minutes before trying again.")]
    RateLimited,

    /// The backend failed to process the request (5xx). Not a credential rejection.
    #[error("server error ({0})")]
    Backend(u16),

    /// Transport failure talking to the backend.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// An authenticated call came back 401; the session has been cleared.
    #[error("Your session has expired. Please sign in again.")]
    SessionExpired,

    /// The login endpoint answered 2xx without a complete session.
    #[error("malformed login response: {0}")]
    MalformedResponse(String),

    /// The store has no persistent backing in this context.
    #[error("session storage is not available in this context")]
    StorageUnavailable,

    /// Reading or writing the session backing failed.
    #[error("session storage error: {0}")]
    Storage(String),

    /// Required configuration is missing or too weak.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON parsing error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The single string a login form shows for this error.
    ///
    /// Transport and internal details are flattened to a generic retry message.
    pub fn display_message(&self) -> String {
        match self {
            Error::Validation(msg) | Error::Credentials(msg) => msg.clone(),
            Error::RateLimited | Error::SessionExpired => self.to_string(),
            Error::Network(_) => "Unable to reach the server. Please try again.".to_string(),
            Error::Backend(status) => format!("Login failed ({status}). Please try again."),
            _ => "An error occurred. Please try again.".to_string(),
        }
    }
}
