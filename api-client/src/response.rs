//! Response types for working with HTTP responses.

use bytes::Bytes;
use http_body_util::BodyExt as _;
use hyperdriver::Body;

use crate::error::{Error, HttpResponseError};

/// Wrapper around an HTTP response that provides additional methods for working with the response,
/// and allows for easy access to the response and request parts.
#[derive(Debug)]
pub struct ApiResponse {
    request: http::request::Parts,
    response: http::response::Parts,
    body: Body,
}

impl ApiResponse {
    /// Create a new `ApiResponse` instance.
    pub fn new(request: http::request::Parts, response: http::response::Response<Body>) -> Self {
        let (response, body) = response.into_parts();

        Self {
            request,
            response,
            body,
        }
    }

    /// Get the status code of the response.
    pub fn status(&self) -> http::StatusCode {
        self.response.status
    }

    /// Get the headers of the response.
    pub fn headers(&self) -> &http::HeaderMap {
        &self.response.headers
    }

    /// Get a header as a string, if it is present and valid.
    pub fn header_str<K>(&self, key: K) -> Option<&str>
    where
        K: http::header::AsHeaderName,
    {
        self.response
            .headers
            .get(key)
            .and_then(|value| value.to_str().ok())
    }

    /// The `Content-Length` of the response, if the server sent a valid one.
    pub fn content_length(&self) -> Option<u64> {
        self.header_str(http::header::CONTENT_LENGTH)?
            .trim()
            .parse()
            .ok()
    }

    /// The target of a `Link: <...>; rel="next"` header, if there is one.
    pub fn next_link(&self) -> Option<&str> {
        self.response
            .headers
            .get_all(http::header::LINK)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .find_map(parse_next_link)
    }

    /// Get the URI of the request that generated the response.
    pub fn uri(&self) -> &http::Uri {
        &self.request.uri
    }

    /// Get the parts of the request that generated the response.
    pub fn request(&self) -> &http::request::Parts {
        &self.request
    }

    /// Get the parts of the response.
    pub fn response(&self) -> &http::response::Parts {
        &self.response
    }

    /// Split into the request parts, response parts and body.
    pub fn into_parts(self) -> (http::request::Parts, http::response::Parts, Body) {
        (self.request, self.response, self.body)
    }

    /// Collect the response body.
    pub async fn bytes(self) -> Result<Bytes, Error> {
        let collected = self
            .body
            .collect()
            .await
            .map_err(|error| Error::ResponseBody(error.into()))?;
        Ok(collected.to_bytes())
    }

    /// Collect the response body as (lossy) UTF-8 text.
    pub async fn text(self) -> Result<String, Error> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Collect the body and deserialize it as JSON.
    pub async fn json<T>(self) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(Error::Decode)
    }

    /// Convert the `ApiResponse` into an `HttpResponseError` instance.
    pub async fn into_error(self) -> HttpResponseError {
        HttpResponseError::from_response(self).await
    }

    /// Convert the `ApiResponse` into an error if the response status is not a success status.
    pub async fn error_for_status(self) -> Result<Self, Error> {
        if self.status().is_success() {
            Ok(self)
        } else {
            Err(Error::Response(self.into_error().await))
        }
    }
}

fn parse_next_link(link: &str) -> Option<&str> {
    let mut params = link.split(';').map(str::trim);
    let target = params.next()?.strip_prefix('<')?.strip_suffix('>')?;

    params
        .filter_map(|param| param.split_once('='))
        .any(|(key, value)| {
            key.trim().eq_ignore_ascii_case("rel")
                && value
                    .trim()
                    .trim_matches('"')
                    .split_ascii_whitespace()
                    .any(|rel| rel.eq_ignore_ascii_case("next"))
        })
        .then_some(target)
}
