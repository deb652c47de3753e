use std::{sync::Arc, time::Duration};

/// Represents a result type for operations in the Featureflow SDK.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the Featureflow SDK.
///
/// Flag evaluation never returns errors: unknown flags and malformed rules resolve to a fallback
/// variant. Errors are only produced while configuring the client, building contexts, and
/// synchronizing flag definitions.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The client configuration is unusable, e.g. there is no API key and no local features.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Invalid base URL configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The request was unauthorized, possibly due to an invalid API key.
    #[error("unauthorized, api_key is likely invalid")]
    Unauthorized,

    /// The server responded with an unexpected status code.
    #[error("unexpected response status: {0}")]
    UnexpectedStatus(u16),

    /// Failed to parse a payload received from the server.
    #[error("failed to parse flag definitions")]
    Parse(#[source] Arc<serde_json::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Flag definitions could not be fetched within the configured wait.
    #[error("flag definitions were not fetched within {0:?}")]
    ReadyTimeout(Duration),

    /// A context was built with an empty key.
    #[error("context key must not be empty")]
    InvalidContext,

    /// A flag definition references variants it does not declare.
    #[error("invalid flag {flag_key:?}: {reason}")]
    InvalidFlag {
        /// Key of the rejected flag.
        flag_key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The client was closed before flag definitions were fetched.
    #[error("client closed")]
    Closed,

    /// Indicates that the synchronizer thread panicked. This should normally never happen.
    #[error("synchronizer thread panicked")]
    SynchronizerPanicked,
}

impl Error {
    /// Returns `true` if the operation that produced this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::UnexpectedStatus(_) | Error::Parse(_) | Error::Network(_) | Error::Io(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Parse(Arc::new(value))
    }
}
