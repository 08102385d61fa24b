//! Authentication for API clients.
//!
//! The `Authentication` trait is used to decorate requests sent by the `ApiClient`.
//! Credentials are only ever attached to requests which target the client's base URL,
//! so a server redirecting us to another host never sees them.
//!
//! Implementations provided here:
//! - `BasicAuth` for Basic authentication
//! - `Credentials`, the choice between anonymous and basic access made at construction time
//! - `()` for no authentication

use std::sync::Arc;

use http::{HeaderValue, Uri};
use secret::Secret;
use tower::layer::Layer;

/// Create a basic authentication header value, with the password being optional.
///
/// Basic authentication Base64 encodes the username and password, separated by a colon.
///
/// # Example
/// ```rust
/// use api_client::basic_auth;
/// let username = "username";
/// let password = "password";
///
/// let header = basic_auth(username, Some(password));
/// assert_eq!(header.to_str().unwrap(), "Basic dXNlcm5hbWU6cGFzc3dvcmQ=");
/// ```
pub fn basic_auth<U, P>(username: U, password: Option<P>) -> HeaderValue
where
    U: std::fmt::Display,
    P: std::fmt::Display,
{
    use base64::prelude::BASE64_STANDARD;
    use base64::write::EncoderWriter;
    use std::io::Write;

    let mut buf = b"Basic ".to_vec();
    {
        let mut encoder = EncoderWriter::new(&mut buf, &BASE64_STANDARD);
        let _ = write!(encoder, "{}:", username);
        if let Some(password) = password {
            let _ = write!(encoder, "{}", password);
        }
    }
    let mut header = HeaderValue::from_bytes(&buf).expect("base64 is always valid HeaderValue");
    header.set_sensitive(true);
    header
}

/// Trait to represent authenticating with an API queried via the `ApiClient`.
pub trait Authentication: Clone {
    /// Called by the `ApiClient` to implement authorization.
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B>;
}

/// Basic authentication, with the password being optional.
///
/// Basic authentication Base64 encodes the username and password, separated by a colon.
/// in a header value prefixed with "Basic ". When both the username and the password
/// are empty, no header is sent at all.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    username: String,
    password: Option<Secret>,
}

impl BasicAuth {
    /// Create a new Basic authentication with a given username and optional password.
    pub fn new<U, P>(username: U, password: Option<P>) -> Self
    where
        U: Into<String>,
        P: Into<Secret>,
    {
        BasicAuth {
            username: username.into(),
            password: password.map(Into::into),
        }
    }

    /// The username sent with each request.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// True when there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.as_ref().is_none_or(Secret::is_empty)
    }
}

impl Authentication for BasicAuth {
    fn authenticate<B>(&self, mut req: http::Request<B>) -> http::Request<B> {
        if self.is_empty() {
            return req;
        }

        if !req.headers().contains_key(http::header::AUTHORIZATION) {
            let header_value =
                basic_auth(&self.username, self.password.as_ref().map(Secret::revealed));
            let headers = req.headers_mut();
            headers.append(http::header::AUTHORIZATION, header_value);
        } else {
            tracing::warn!("{} header already set", http::header::AUTHORIZATION);
        }
        req
    }
}

/// Credentials for a client, chosen when the client is constructed.
#[derive(Debug, Clone, Default)]
pub enum Credentials {
    /// Send requests without an `Authorization` header.
    #[default]
    Anonymous,

    /// Send HTTP basic credentials.
    Basic(BasicAuth),
}

impl Credentials {
    /// Basic credentials, or anonymous access when neither part is given.
    pub fn from_parts<U, P>(username: Option<U>, password: Option<P>) -> Self
    where
        U: Into<String>,
        P: Into<Secret>,
    {
        match (username, password) {
            (None, None) => Credentials::Anonymous,
            (username, password) => Credentials::Basic(BasicAuth::new(
                username.map(Into::<String>::into).unwrap_or_default(),
                password,
            )),
        }
    }

    /// True when requests are sent without credentials.
    pub fn is_anonymous(&self) -> bool {
        match self {
            Credentials::Anonymous => true,
            Credentials::Basic(auth) => auth.is_empty(),
        }
    }
}

impl Authentication for Credentials {
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B> {
        match self {
            Credentials::Anonymous => req,
            Credentials::Basic(auth) => auth.authenticate(req),
        }
    }
}

impl Authentication for () {
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B> {
        req
    }
}

/// Does `target` live underneath `base`?
///
/// This is a string prefix match on the full URI which also respects path segment
/// boundaries, so `http://host/reg` scopes `http://host/reg/v2/` but not `http://host/register`.
pub fn in_scope(base: &Uri, target: &Uri) -> bool {
    let base = base.to_string();
    let target = target.to_string();

    let Some(rest) = target.strip_prefix(&base) else {
        return false;
    };

    base.ends_with('/') || rest.is_empty() || rest.starts_with(['/', '?', '#'])
}

/// A layer which authenticates requests sent to a base URL.
#[derive(Debug)]
pub struct AuthenticationLayer<A> {
    auth: Arc<A>,
    scope: Arc<Uri>,
}

impl<A> Clone for AuthenticationLayer<A> {
    fn clone(&self) -> Self {
        Self {
            auth: self.auth.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<A> AuthenticationLayer<A> {
    /// Authenticate requests for URLs starting with `scope`.
    pub fn new(auth: Arc<A>, scope: Arc<Uri>) -> Self {
        Self { auth, scope }
    }
}

impl<A, S> Layer<S> for AuthenticationLayer<A> {
    type Service = AuthenticationService<A, S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticationService::new(inner, self.auth.clone(), self.scope.clone())
    }
}

/// A service which authenticates requests sent to a base URL, and passes every other
/// request through untouched.
#[derive(Debug)]
pub struct AuthenticationService<A, S> {
    inner: S,
    auth: Arc<A>,
    scope: Arc<Uri>,
}

impl<A, S: Clone> Clone for AuthenticationService<A, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            auth: self.auth.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<A, S> AuthenticationService<A, S> {
    pub(crate) fn new(inner: S, auth: Arc<A>, scope: Arc<Uri>) -> Self {
        Self { inner, auth, scope }
    }
}

impl<A, S, BIn, BOut> tower::Service<http::Request<BIn>> for AuthenticationService<A, S>
where
    A: Authentication,
    S: tower::Service<http::Request<BIn>, Response = http::Response<BOut>>,
    S::Future: Send + 'static,
{
    type Response = http::Response<BOut>;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<BIn>) -> Self::Future {
        let req = if in_scope(&self.scope, req.uri()) {
            self.auth.authenticate(req)
        } else {
            tracing::debug!(uri = %req.uri(), "not sending credentials outside of {}", self.scope);
            req
        };
        self.inner.call(req)
    }
}
