//! An in-memory service for exercising API clients without a network.
//!
//! Responses are registered by path, optionally with a query string, and optionally for
//! one method only. A request whose path and query match an entry exactly gets that
//! entry, otherwise the entry for the bare path is used. Entries for the request's method
//! win over entries for any method. Unknown paths answer `404 Not Found`.

use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use parking_lot::Mutex;

use crate::BoxFuture;

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl MockResponse {
    fn build(&self, method: &Method) -> http::Response<hyperdriver::Body> {
        let body = if method == Method::HEAD {
            hyperdriver::Body::empty()
        } else {
            hyperdriver::Body::from(self.body.clone())
        };

        let mut response = http::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();
        response
    }
}

/// A request observed by a [`MockService`].
#[derive(Debug, Clone)]
pub struct MockCall {
    /// Request method.
    pub method: Method,

    /// Full request URI.
    pub uri: Uri,

    /// The `Authorization` header, if one was sent.
    pub authorization: Option<HeaderValue>,
}

/// A tower service which answers from a table of canned responses and records every call.
#[derive(Debug, Clone, Default)]
pub struct MockService {
    responses: Arc<HashMap<(Option<Method>, String), MockResponse>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    delay: Option<Duration>,
}

impl MockService {
    /// An empty service, which answers every request with `404 Not Found`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response for `path`, which may include a query string.
    pub fn add<B: Into<Bytes>>(
        &mut self,
        path: &str,
        status: StatusCode,
        headers: HeaderMap,
        body: B,
    ) {
        self.insert(None, path, status, headers, body.into());
    }

    /// Register a response for `path` which only answers requests using `method`.
    pub fn add_for<B: Into<Bytes>>(
        &mut self,
        method: Method,
        path: &str,
        status: StatusCode,
        headers: HeaderMap,
        body: B,
    ) {
        self.insert(Some(method), path, status, headers, body.into());
    }

    fn insert(
        &mut self,
        method: Option<Method>,
        path: &str,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    ) {
        Arc::make_mut(&mut self.responses).insert(
            (method, path.to_owned()),
            MockResponse {
                status,
                headers,
                body,
            },
        );
    }

    /// Register a `200 OK` JSON response for `path`.
    pub fn add_json(&mut self, path: &str, body: &serde_json::Value) {
        self.add_json_with_headers(path, body, HeaderMap::new());
    }

    /// Register a `200 OK` JSON response for `path` with extra headers.
    pub fn add_json_with_headers(
        &mut self,
        path: &str,
        body: &serde_json::Value,
        mut headers: HeaderMap,
    ) {
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.add(path, StatusCode::OK, headers, body.to_string());
    }

    /// Hold every response back for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request seen so far, in arrival order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// How many requests used `method` against `path` (ignoring any query string).
    pub fn count(&self, method: &Method, path: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| &call.method == method && call.uri.path() == path)
            .count()
    }

    fn lookup(&self, method: &Method, uri: &Uri) -> Option<&MockResponse> {
        let exact = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or(uri.path());
        [Some(method.clone()), None].into_iter().find_map(|method| {
            self.responses
                .get(&(method.clone(), exact.to_owned()))
                .or_else(|| self.responses.get(&(method, uri.path().to_owned())))
        })
    }
}

/// A `Link` header which points at the next page.
pub fn next_link(target: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!("<{target}>; rel=\"next\"")) {
        headers.insert(http::header::LINK, value);
    }
    headers
}

impl tower::Service<http::Request<hyperdriver::Body>> for MockService {
    type Response = http::Response<hyperdriver::Body>;
    type Error = hyperdriver::client::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<hyperdriver::Body>) -> Self::Future {
        let method = req.method().clone();
        let uri = req.uri().clone();

        self.calls.lock().push(MockCall {
            method: method.clone(),
            uri: uri.clone(),
            authorization: req.headers().get(http::header::AUTHORIZATION).cloned(),
        });

        let response = match self.lookup(&method, &uri) {
            Some(canned) => canned.build(&method),
            None => {
                tracing::debug!(%uri, "no canned response");
                let mut response = http::Response::new(hyperdriver::Body::empty());
                *response.status_mut() = StatusCode::NOT_FOUND;
                response
            }
        };

        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tower::ServiceExt as _;

    fn request(method: Method, uri: &str) -> http::Request<hyperdriver::Body> {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(hyperdriver::Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn exact_query_wins_over_path() {
        let mut mock = MockService::new();
        mock.add("/list", StatusCode::OK, HeaderMap::new(), "all");
        mock.add("/list?n=1", StatusCode::ACCEPTED, HeaderMap::new(), "one");

        let res = mock
            .clone()
            .oneshot(request(Method::GET, "http://mock.test/list?n=1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);

        let res = mock
            .clone()
            .oneshot(request(Method::GET, "http://mock.test/list?n=2"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = mock
            .clone()
            .oneshot(request(Method::HEAD, "http://mock.test/other"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        assert_eq!(mock.count(&Method::GET, "/list"), 2);
        assert_eq!(mock.count(&Method::HEAD, "/other"), 1);
    }

    #[tokio::test]
    async fn method_entries_win() {
        let mut mock = MockService::new();
        mock.add("/manifest", StatusCode::OK, HeaderMap::new(), "body");
        mock.add_for(
            Method::HEAD,
            "/manifest",
            StatusCode::METHOD_NOT_ALLOWED,
            HeaderMap::new(),
            Vec::new(),
        );

        let res = mock
            .clone()
            .oneshot(request(Method::HEAD, "http://mock.test/manifest"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

        let res = mock
            .clone()
            .oneshot(request(Method::GET, "http://mock.test/manifest?n=1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[test]
    fn link_header() {
        let headers = next_link("/v2/_catalog?last=b&n=2");
        assert_eq!(
            headers.get(http::header::LINK).unwrap(),
            "</v2/_catalog?last=b&n=2>; rel=\"next\""
        );
    }
}
