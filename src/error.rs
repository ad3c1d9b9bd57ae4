//! Error types.
//!
//! Two families live here and they never mix:
//!
//! - [`Error`] covers setup and infrastructure failures: binding a port,
//!   registering a metric twice, an invalid bucket layout. These surface
//!   before traffic is served and should abort startup.
//! - [`HttpError`] is what a handler returns when it wants a specific status
//!   code. Handlers return `anyhow::Error`, so any error type works. The
//!   status code is only recovered when the error is (or wraps) an `HttpError`.

use http::StatusCode;

/// Result type returned by handlers and middleware.
pub type HandlerResult<T = crate::Response> = Result<T, anyhow::Error>;

/// The error type returned by tsu-pack's fallible setup operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Duplicate registration, invalid metric name, or invalid buckets.
    #[error("metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// A handler error that carries the HTTP status it should be answered with.
///
/// ```rust
/// use tsu_pack::{HttpError, Request, Response};
///
/// async fn admin(req: Request) -> Result<Response, HttpError> {
///     if req.header("authorization").is_none() {
///         return Err(HttpError::forbidden());
///     }
///     Ok(Response::text("welcome"))
/// }
/// ```
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status}: {message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    /// An error whose message is the canonical reason phrase of `status`.
    pub fn new(status: StatusCode) -> Self {
        let message = status.canonical_reason().unwrap_or_default().to_owned();
        Self { status, message }
    }

    pub fn with_message(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn forbidden() -> Self { Self::new(StatusCode::FORBIDDEN) }
    pub fn not_found() -> Self { Self::new(StatusCode::NOT_FOUND) }
    pub fn method_not_allowed() -> Self { Self::new(StatusCode::METHOD_NOT_ALLOWED) }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn message(&self) -> &str { &self.message }
}
