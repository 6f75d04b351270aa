//! Error types for the Force.com client.

use crate::types::ApiErrorEntry;
use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Force.com client.
#[derive(Error, Debug)]
pub enum Error {
    /// The credentials do not describe any usable grant or token state.
    #[error("Incomplete credentials: {0}")]
    IncompleteCredentials(String),

    /// The token endpoint rejected the grant.
    #[error("Authentication failed ({error}): {description}")]
    Authentication {
        /// OAuth2 error code, e.g. `invalid_grant`.
        error: String,
        /// Human readable description returned by the server.
        description: String,
    },

    /// The request never produced a usable response.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server still answered 401 after the token was refreshed.
    #[error("Session expired: the request was rejected again after refreshing the access token")]
    SessionExpired,

    /// The API returned its standard error envelope.
    #[error("API error ({status}): {}", summarize(.errors))]
    Api {
        /// HTTP status code
        status: u16,
        /// Errors in the order the server listed them
        errors: Vec<ApiErrorEntry>,
    },

    /// Record not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A successful response body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    /// A resource name is absent from the discovered resource map.
    #[error("Resource `{0}` is not available for this API version")]
    MissingResource(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failures below the API layer.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network, DNS, TLS or timeout failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a body that is not the documented envelope.
    #[error("Malformed {context} response (status {status}): {source}")]
    Malformed {
        /// Which envelope was expected
        context: &'static str,
        /// HTTP status code
        status: u16,
        #[source]
        source: serde_json::Error,
    },
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(TransportError::Http(err))
    }
}

impl Error {
    /// Build an error from a non-success data API response body.
    pub(crate) fn from_api_body(status: u16, body: &[u8]) -> Self {
        if body.is_empty() {
            return Error::Api {
                status,
                errors: Vec::new(),
            };
        }

        match serde_json::from_slice::<Vec<ApiErrorEntry>>(body) {
            Ok(errors) => Error::Api { status, errors },
            Err(source) => Error::Transport(TransportError::Malformed {
                context: "error",
                status,
                source,
            }),
        }
    }

    /// Build an error from a non-success token endpoint response body.
    pub(crate) fn from_token_body(status: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<OAuthErrorResponse>(body) {
            Ok(err) => Error::Authentication {
                error: err.error,
                description: err.error_description.unwrap_or_default(),
            },
            Err(source) => Error::Transport(TransportError::Malformed {
                context: "token error",
                status,
                source,
            }),
        }
    }

    /// HTTP status code of an [`Error::Api`] error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn summarize(errors: &[ApiErrorEntry]) -> String {
    if errors.is_empty() {
        return "no error details".into();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.error_code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(serde::Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}
