//! Unified error type.

use http::StatusCode;

/// Boxed error produced by body streams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by tsu's fallible operations.
///
/// Infrastructure failures (binding a port, accepting a connection) surface
/// as [`Error::Io`]. Handlers may also return `Result<_, Error>`: the error
/// travels with the response until a middleware or the router hands it to the
/// central error handler (see [`Router::error_handler`](crate::Router::error_handler)).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    /// An application error that maps to a specific HTTP status.
    #[error("{status}: {message}")]
    Http { status: StatusCode, message: String },

    #[error("body: {0}")]
    Body(#[source] BoxError),
}

impl Error {
    /// An application error answered with `status` and `message` as body.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http { status, message: message.into() }
    }

    pub fn body(err: impl Into<BoxError>) -> Self {
        Self::Body(err.into())
    }

    /// The status the default error handler answers with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Http { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
