//! Error types for the transport core.
//!
//! # Design
//! Every failure is terminal for the request it belongs to, so there is a
//! single flat enum rather than a layered hierarchy. Each variant carries a
//! short context string for logs; callers that only care about the class of
//! failure match on `NetError::kind()`.

use std::fmt;

/// Errors reported through `LoaderDelegate::deliver_error` and returned by the
/// loader.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetError {
    /// The request method is not on the allow-list.
    #[error("method {0:?} is not allowed")]
    InvalidMethod(String),

    /// Hostname resolution failed or yielded no addresses.
    #[error("name not resolved: {0}")]
    NameNotResolved(String),

    /// No resolved endpoint accepted the TCP connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The TLS handshake did not complete (including certificate rejection).
    #[error("ssl handshake not completed: {0}")]
    SslHandshakeIncomplete(String),

    /// Writing the serialized request to the socket failed.
    #[error("request write failed: {0}")]
    RequestWriteFailed(String),

    /// The status line or header block could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The response body could not be pushed to the streaming consumer.
    #[error("body transfer failed: {0}")]
    BodyTransferFailed(String),

    /// The buffered-mode destination could not be sized to fit the body.
    #[error("unable to allocate a {0} byte response buffer")]
    BufferAllocationFailed(usize),

    /// Catch-all for unclassified socket read/write failures.
    #[error("transport failed: {0}")]
    TransportFailed(String),

    /// Malformed URL, unsupported scheme, or API misuse.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An upload element reader failed while draining the request body.
    #[error("upload read failed: {0}")]
    UploadReadFailed(String),

    /// The redirect chain exceeded the configured budget.
    #[error("too many redirects ({0})")]
    TooManyRedirects(usize),
}

/// Payload-free discriminant of `NetError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidMethod,
    NameNotResolved,
    ConnectionFailed,
    SslHandshakeIncomplete,
    RequestWriteFailed,
    InvalidResponse,
    BodyTransferFailed,
    BufferAllocationFailed,
    TransportFailed,
    InvalidArgument,
    UploadReadFailed,
    TooManyRedirects,
}

impl ErrorKind {
    /// Stable short name, suitable for logs and metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidMethod => "NETWORK_ERR_INVALID_METHOD",
            ErrorKind::NameNotResolved => "NETWORK_ERR_NAME_NOT_RESOLVED",
            ErrorKind::ConnectionFailed => "NETWORK_ERR_CONNECTION_FAILED",
            ErrorKind::SslHandshakeIncomplete => "NETWORK_ERR_SSL_HANDSHAKE_NOT_COMPLETED",
            ErrorKind::RequestWriteFailed => "NETWORK_ERR_REQUEST_WRITE_FAILED",
            ErrorKind::InvalidResponse => "NETWORK_ERR_INVALID_RESPONSE",
            ErrorKind::BodyTransferFailed => "NETWORK_ERR_BODY_TRANSFER_FAILED",
            ErrorKind::BufferAllocationFailed => "NETWORK_ERR_BUFFER_ALLOCATION_FAILED",
            ErrorKind::TransportFailed => "NETWORK_ERR_FAILED",
            ErrorKind::InvalidArgument => "NETWORK_ERR_INVALID_ARGUMENT",
            ErrorKind::UploadReadFailed => "NETWORK_ERR_UPLOAD_READ_FAILED",
            ErrorKind::TooManyRedirects => "NETWORK_ERR_TOO_MANY_REDIRECTS",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl NetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetError::InvalidMethod(_) => ErrorKind::InvalidMethod,
            NetError::NameNotResolved(_) => ErrorKind::NameNotResolved,
            NetError::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            NetError::SslHandshakeIncomplete(_) => ErrorKind::SslHandshakeIncomplete,
            NetError::RequestWriteFailed(_) => ErrorKind::RequestWriteFailed,
            NetError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            NetError::BodyTransferFailed(_) => ErrorKind::BodyTransferFailed,
            NetError::BufferAllocationFailed(_) => ErrorKind::BufferAllocationFailed,
            NetError::TransportFailed(_) => ErrorKind::TransportFailed,
            NetError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            NetError::UploadReadFailed(_) => ErrorKind::UploadReadFailed,
            NetError::TooManyRedirects(_) => ErrorKind::TooManyRedirects,
        }
    }
}

/// Errors returned while loading a `TransportConfig`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
