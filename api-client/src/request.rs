use std::time::Duration;

use http::{header::HeaderValue, HeaderName, Uri};

use crate::error::Error;
use crate::{response::ApiResponse, ApiClient, Authentication};

/// Access to the head of a request without its body.
pub trait RequestExt {
    /// Copy the method, URI and headers of this request.
    fn parts(&self) -> http::request::Parts;
}

impl<B> RequestExt for http::Request<B> {
    fn parts(&self) -> http::request::Parts {
        let (mut parts, ()) = http::Request::new(()).into_parts();
        parts.method = self.method().clone();
        parts.uri = self.uri().clone();
        parts.version = self.version();
        parts.headers = self.headers().clone();
        parts
    }
}

/// Builder for a single request sent through an [`ApiClient`].
///
/// Errors made while building are held until [`RequestBuilder::send`].
#[derive(Debug)]
pub struct RequestBuilder<A> {
    req: Result<http::request::Builder, Error>,
    client: ApiClient<A>,
    timeout: Option<Duration>,
}

impl<A> RequestBuilder<A> {
    /// Start a request against `uri`.
    pub fn new(client: ApiClient<A>, uri: Uri, method: http::Method) -> Self {
        Self {
            req: Ok(http::Request::builder().method(method).uri(uri)),
            client,
            timeout: None,
        }
    }

    /// A request which fails with `error` when sent.
    pub(crate) fn invalid(client: ApiClient<A>, error: Error) -> Self {
        Self {
            req: Err(error),
            client,
            timeout: None,
        }
    }

    /// Add a header to the request.
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.req = self.req.map(|req| req.header(key, value));
        self
    }

    /// Ask for any of the given media types.
    pub fn accept<I, S>(self, media_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let accept = media_types
            .into_iter()
            .map(|media_type| media_type.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join(", ");
        self.header(http::header::ACCEPT, accept)
    }

    /// Override the client deadline for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send the request. The response is returned whatever its status.
    pub async fn send(self) -> Result<ApiResponse, Error>
    where
        A: Authentication,
    {
        let req = self.req?.body(hyperdriver::Body::empty())?;

        match self.timeout.or(self.client.timeout()) {
            Some(timeout) => match tokio::time::timeout(timeout, self.client.execute(req)).await {
                Ok(res) => res,
                Err(_) => Err(Error::Timeout),
            },
            None => self.client.execute(req).await,
        }
    }
}
