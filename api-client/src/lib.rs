//! A small HTTP API client built on hyperdriver and tower.
//!
//! Requests are made relative to a base URL. Credentials are attached by an
//! [`AuthenticationLayer`] only to requests which stay underneath that base URL.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use http::Uri;
use hyperdriver::service::SharedService;
pub use secret::Secret;
use tower::ServiceExt;

mod authentication;
pub mod error;
pub mod mock;
mod paginate;
pub mod request;
pub mod response;
pub mod uri;

pub use self::authentication::{
    basic_auth, in_scope, Authentication, AuthenticationLayer, AuthenticationService, BasicAuth,
    Credentials,
};
pub use self::error::{Error, HttpResponseError};
pub use self::paginate::{Page, PageState, Paginated, Paginator, DEFAULT_MAX_PAGES};
pub use self::request::RequestBuilder;
use self::request::RequestExt as _;
use self::response::ApiResponse;
use self::uri::UriExtension as _;

/// Boxed future used by the API client.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A client for accessing APIs over HTTP / HTTPS
///
/// Useful inner object to wrap for individual API clients.
#[derive(Debug)]
pub struct ApiClient<A> {
    base: Arc<Uri>,
    inner: hyperdriver::client::SharedClientService<hyperdriver::Body, hyperdriver::Body>,
    authentication: Arc<A>,
    timeout: Option<Duration>,
}

impl<A> Clone for ApiClient<A> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            inner: self.inner.clone(),
            authentication: self.authentication.clone(),
            timeout: self.timeout,
        }
    }
}

impl<A> ApiClient<A>
where
    A: Authentication + Send + Sync + 'static,
{
    /// Create a new API Client from a base URL and an authentication method
    pub fn new(base: Uri, authentication: A) -> Self {
        let base = Arc::new(base);
        let authentication = Arc::new(authentication);
        let inner = hyperdriver::Client::build_tcp_http()
            .with_default_tls()
            .layer(AuthenticationLayer::new(
                authentication.clone(),
                base.clone(),
            ))
            .build_service();

        ApiClient {
            base,
            inner,
            authentication,
            timeout: None,
        }
    }

    /// Create a new API Client which sends requests through `inner` instead of the network.
    pub fn new_with_inner_service<S>(base: Uri, authentication: A, inner: S) -> Self
    where
        S: tower::Service<
                http::Request<hyperdriver::Body>,
                Response = http::Response<hyperdriver::Body>,
                Error = hyperdriver::client::Error,
            > + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        let base = Arc::new(base);
        let authentication = Arc::new(authentication);

        let service = tower::ServiceBuilder::new()
            .layer(SharedService::layer())
            .layer(AuthenticationLayer::new(
                authentication.clone(),
                base.clone(),
            ))
            .service(inner);

        ApiClient {
            base,
            inner: service,
            authentication,
            timeout: None,
        }
    }
}

impl<A> ApiClient<A> {
    /// Give every request sent by this client a deadline.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The deadline applied to requests, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The base URL requests are made relative to.
    pub fn base(&self) -> &Uri {
        &self.base
    }

    /// The authentication used for requests to the base URL.
    pub fn auth(&self) -> &A {
        &self.authentication
    }

    /// Resolve a path underneath the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Uri, Error> {
        Ok(self.base.join(path)?)
    }

    /// Build a GET request for a path underneath the base URL.
    pub fn get(&self, path: &str) -> RequestBuilder<A> {
        self.request_path(Method::GET, path)
    }

    /// Build a HEAD request for a path underneath the base URL.
    pub fn head(&self, path: &str) -> RequestBuilder<A> {
        self.request_path(Method::HEAD, path)
    }

    /// Build a request for a path underneath the base URL.
    ///
    /// A path which does not form a valid URI fails when the request is sent.
    pub fn request_path(&self, method: Method, path: &str) -> RequestBuilder<A> {
        match self.endpoint(path) {
            Ok(uri) => self.request(method, uri),
            Err(error) => RequestBuilder::invalid(self.clone(), error),
        }
    }

    /// Build a request against an absolute URI.
    pub fn request(&self, method: Method, uri: Uri) -> RequestBuilder<A> {
        RequestBuilder::new(self.clone(), uri, method)
    }
}

impl<A> ApiClient<A>
where
    A: Authentication,
{
    /// Send a request through the client's service stack.
    pub async fn execute(&self, req: http::Request<hyperdriver::Body>) -> Result<ApiResponse, Error> {
        let parts = req.parts();

        let response = self.inner.clone().oneshot(req).await?;
        Ok(ApiResponse::new(parts, response))
    }
}
