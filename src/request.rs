//! Incoming HTTP request type.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::request::Parts;
use http::{Extensions, Method, Uri};
use parking_lot::Mutex;

/// An incoming HTTP request with its body already collected.
pub struct Request {
    pub(crate) head: Parts,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) route: Option<Arc<str>>,
    pub(crate) response_headers: ResponseHeaders,
}

impl Request {
    pub(crate) fn from_parts(head: Parts, body: Bytes) -> Self {
        Self {
            head,
            body,
            params: HashMap::new(),
            route: None,
            response_headers: ResponseHeaders::default(),
        }
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn path(&self) -> &str { self.head.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Header lookup by name. Returns `None` for values that are not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The route pattern this request matched, e.g. `/users/{id}`.
    ///
    /// `None` until the router has matched the request, and for requests that
    /// matched no route at all.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn extensions(&self) -> &Extensions { &self.head.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.head.extensions }

    /// Headers to add to whatever response this request ends up producing.
    ///
    /// Middleware stages headers here before calling downstream. The router
    /// applies them after the error handler has run, so they also land on
    /// error responses.
    pub fn response_headers(&self) -> &ResponseHeaders {
        &self.response_headers
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (head, body) = req.into_parts();
        Self::from_parts(head, body)
    }
}

/// Shared, per-request set of staged response headers.
///
/// Cloning gives another handle to the same set.
#[derive(Clone, Default)]
pub struct ResponseHeaders(Arc<Mutex<HeaderMap>>);

impl ResponseHeaders {
    /// Stages `value` under `name`, replacing anything staged before.
    pub fn insert(&self, name: HeaderName, value: HeaderValue) {
        self.0.lock().insert(name, value);
    }

    pub fn get(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.0.lock().get(name).cloned()
    }

    /// Copies staged headers into `headers`. Names the response already
    /// carries are left alone.
    pub(crate) fn apply_to(&self, headers: &mut HeaderMap) {
        let staged = self.0.lock();
        for name in staged.keys() {
            if headers.contains_key(name) {
                continue;
            }
            for value in staged.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
    }
}
