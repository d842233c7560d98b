//! Error types for the client layer.
//!
//! Three families of failures exist:
//!
//! - [`Error`] covers problems detected before anything reaches the wire: a
//!   client without a base URL, an invalid header, a request body that cannot be
//!   encoded for its declared content type.
//! - [`TransportError`] describes why an HTTP exchange did not produce a response.
//!   It is never returned from an operation directly; it is carried inside the
//!   typed [`Response`](crate::Response) handed to the completion callback.
//! - [`ParseError`](crate::ParseError) (see [`codec`](crate::codec)) reports JSON
//!   shapes that do not match a model.

/// Errors raised while preparing or dispatching an operation.
///
/// When an operation returns one of these, nothing was sent and the completion
/// callback is never invoked.
///
/// # Examples
///
/// ```
/// use ims_orchestration::{ApiClient, Error};
///
/// let mut client = ApiClient::builder().build();
/// match client.add_header_param("bad header", "value") {
///     Err(Error::InvalidHeader(msg)) => assert!(msg.contains("bad header")),
///     other => panic!("unexpected: {:?}", other),
/// }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid or missing configuration, e.g. an API client used before its base
    /// URL was set.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A header name or value was rejected.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The request body could not be encoded.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// The request declares only content types this layer cannot encode a body
    /// for (multipart or url-encoded forms).
    #[error("Request content type not supported ({0})")]
    UnsupportedContentType(String),

    /// A computed resource path holds an empty or dot segment, which would
    /// address a different resource once the URL is normalized.
    #[error("Invalid path segment in {0}")]
    InvalidPath(String),

    /// An invalid URL was provided or computed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Why an HTTP exchange produced no response.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established, so the request never reached
    /// the server.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The exchange timed out, either at the transport or because the retry
    /// budget's relative timeout elapsed while the attempt was in flight.
    #[error("Request timed out")]
    Timeout,

    /// Any other failure after the request may have been sent.
    #[error("Request failed: {0}")]
    Request(String),

    /// The owning client or retry manager was dropped with the request in flight.
    #[error("Request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Returns `true` if the request is known not to have reached the server.
    pub fn is_connect(&self) -> bool {
        matches!(self, TransportError::Connect(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else if error.is_connect() {
            TransportError::Connect(error.to_string())
        } else {
            TransportError::Request(error.to_string())
        }
    }
}

/// A specialized `Result` type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_classification() {
        assert!(TransportError::Connect("refused".to_string()).is_connect());
        assert!(!TransportError::Timeout.is_connect());
        assert!(!TransportError::Request("reset".to_string()).is_connect());
        assert!(!TransportError::Cancelled.is_connect());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::UnsupportedContentType("multipart/form-data".to_string());
        assert_eq!(
            err.to_string(),
            "Request content type not supported (multipart/form-data)"
        );
        assert_eq!(TransportError::Timeout.to_string(), "Request timed out");
    }
}
