//! Correlation-id propagation.
//!
//! Every request that is not skipped leaves with the configured header set on
//! its response. An inbound, non-empty value is echoed back; otherwise a fresh
//! id is generated. The id is also stored in the request extensions as
//! [`RequestId`] so handlers can log it.

use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::warn;

use super::{Middleware, Next, Skipper, default_skipper};
use crate::error::HandlerResult;
use crate::handler::BoxFuture;
use crate::request::Request;

const DEFAULT_HEADER: &str = "x-request-id";
const ID_LEN: usize = 32;

/// Generates a new correlation id.
pub type Generator = Arc<dyn Fn() -> String + Send + Sync>;

/// The correlation id of the current request, stored in its extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Configuration for [`RequestIdMiddleware`]. Unset fields fall back to defaults.
#[derive(Clone, Default)]
pub struct RequestIdConfig {
    /// Header read from the request and written to the response.
    /// Default `X-Request-Id`.
    pub header: Option<HeaderName>,
    /// Default never skips.
    pub skipper: Option<Skipper>,
    /// Default [`random_id`].
    pub generator: Option<Generator>,
}

impl RequestIdConfig {
    pub fn with_header(mut self, header: HeaderName) -> Self {
        self.header = Some(header);
        self
    }

    pub fn with_skipper(mut self, skipper: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Self {
        self.skipper = Some(Arc::new(skipper));
        self
    }

    pub fn with_generator(mut self, generator: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.generator = Some(Arc::new(generator));
        self
    }
}

/// Propagates or generates a correlation id. See the [module docs](self).
pub struct RequestIdMiddleware {
    header: HeaderName,
    skipper: Skipper,
    generator: Generator,
}

impl RequestIdMiddleware {
    pub fn new(config: RequestIdConfig) -> Self {
        Self {
            header: config.header.unwrap_or(HeaderName::from_static(DEFAULT_HEADER)),
            skipper: config.skipper.unwrap_or_else(default_skipper),
            generator: config.generator.unwrap_or_else(|| Arc::new(random_id)),
        }
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    fn generate(&self) -> HeaderValue {
        let id = (self.generator)();
        match HeaderValue::try_from(id) {
            Ok(value) if !value.is_empty() => value,
            _ => {
                warn!(header = %self.header, "generated request id is not a valid header value, using a random one");
                random_header_value()
            }
        }
    }
}

impl Default for RequestIdMiddleware {
    fn default() -> Self {
        Self::new(RequestIdConfig::default())
    }
}

impl Middleware for RequestIdMiddleware {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture<HandlerResult> {
        if (self.skipper)(&req) {
            return next.run(req);
        }

        let id = match req.headers().get(&self.header) {
            Some(inbound) if !inbound.is_empty() => inbound.clone(),
            _ => self.generate(),
        };

        if let Ok(s) = id.to_str() {
            req.extensions_mut().insert(RequestId(s.to_owned()));
        }
        req.response_headers().insert(self.header.clone(), id);

        next.run(req)
    }
}

/// A 32-character alphanumeric id. Not cryptographically secure.
pub fn random_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

fn random_header_value() -> HeaderValue {
    // Alphanumeric output is always a valid header value.
    HeaderValue::try_from(random_id()).unwrap_or(HeaderValue::from_static("0"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::{HttpError, Response, Router};

    async fn echo_id(req: Request) -> Result<Response, HttpError> {
        let id = req.extensions().get::<RequestId>().map(|id| id.0.clone()).unwrap_or_default();
        Ok(Response::text(id))
    }

    async fn forbidden(_req: Request) -> Result<Response, HttpError> {
        Err(HttpError::forbidden())
    }

    fn app(config: RequestIdConfig) -> Router {
        Router::new()
            .middleware(RequestIdMiddleware::new(config))
            .get("/id", echo_id)
            .get("/forbidden", forbidden)
    }

    fn get(path: &str, inbound: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri(path);
        if let Some(id) = inbound {
            builder = builder.header("x-request-id", id);
        }
        builder.body(Bytes::new()).unwrap().into()
    }

    #[tokio::test]
    async fn test_inbound_id_is_echoed() {
        let res = app(RequestIdConfig::default()).handle(get("/id", Some("abc123"))).await;
        assert_eq!(res.headers()["x-request-id"], "abc123");
        assert_eq!(res.body(), b"abc123");
    }

    #[tokio::test]
    async fn test_missing_id_is_generated() {
        let res = app(RequestIdConfig::default()).handle(get("/id", None)).await;
        let id = res.headers()["x-request-id"].to_str().unwrap().to_owned();
        assert_eq!(id.len(), ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(res.body(), id.as_bytes());
    }

    #[tokio::test]
    async fn test_empty_inbound_id_is_replaced() {
        let config = RequestIdConfig::default().with_generator(|| "fresh".to_owned());
        let res = app(config).handle(get("/id", Some(""))).await;
        assert_eq!(res.headers()["x-request-id"], "fresh");
    }

    #[tokio::test]
    async fn test_id_is_set_on_error_responses() {
        let res = app(RequestIdConfig::default()).handle(get("/forbidden", Some("abc123"))).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(res.headers()["x-request-id"], "abc123");
    }

    #[tokio::test]
    async fn test_custom_header_name() {
        let config = RequestIdConfig::default()
            .with_header(HeaderName::from_static("x-correlation-id"))
            .with_generator(|| "corr-1".to_owned());
        let res = app(config).handle(get("/id", Some("ignored"))).await;
        assert_eq!(res.headers()["x-correlation-id"], "corr-1");
        assert!(res.headers().get("x-request-id").is_none());
    }

    #[tokio::test]
    async fn test_invalid_generated_id_falls_back_to_random() {
        let config = RequestIdConfig::default().with_generator(|| "bad\nvalue".to_owned());
        let res = app(config).handle(get("/id", None)).await;
        assert_eq!(res.headers()["x-request-id"].len(), ID_LEN);
    }

    #[tokio::test]
    async fn test_skipped_request_gets_no_header() {
        let config = RequestIdConfig::default().with_skipper(|req| req.path() == "/id");
        let res = app(config).handle(get("/id", Some("abc123"))).await;
        assert!(res.headers().get("x-request-id").is_none());
        assert!(res.body().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_requests_get_distinct_ids() {
        let router = Arc::new(app(RequestIdConfig::default()));
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..64 {
            let router = Arc::clone(&router);
            tasks.spawn(async move {
                let res = router.handle(get("/id", None)).await;
                res.headers()["x-request-id"].to_str().unwrap().to_owned()
            });
        }

        let mut ids = HashSet::new();
        while let Some(id) = tasks.join_next().await {
            assert!(ids.insert(id.unwrap()));
        }
        assert_eq!(ids.len(), 64);
    }
}
