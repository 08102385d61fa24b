//! Building request URIs underneath a base URL.

use http::Uri;
use thiserror::Error;
use url::Url;

/// A value could not be used as the base URL of an API.
#[derive(Debug, Error)]
pub enum InvalidBaseUrl {
    /// Not a URL at all.
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// A URL such as `mailto:` which paths cannot be joined onto.
    #[error("{0} cannot be used as a base URL")]
    NotABase(String),

    /// Valid as a URL but rejected as an HTTP URI.
    #[error("invalid URI: {0}")]
    Invalid(#[from] http::uri::InvalidUri),
}

/// Convert a value into an absolute URI suitable as an API base.
pub trait IntoUri {
    /// Convert the value into a URI.
    fn into_uri(self) -> Result<Uri, InvalidBaseUrl>;
}

impl IntoUri for Url {
    fn into_uri(self) -> Result<Uri, InvalidBaseUrl> {
        if self.cannot_be_a_base() {
            return Err(InvalidBaseUrl::NotABase(self.into()));
        }
        Ok(self.as_str().parse()?)
    }
}

impl IntoUri for &str {
    fn into_uri(self) -> Result<Uri, InvalidBaseUrl> {
        self.parse::<Url>()?.into_uri()
    }
}

impl IntoUri for String {
    fn into_uri(self) -> Result<Uri, InvalidBaseUrl> {
        self.as_str().into_uri()
    }
}

/// Path and query manipulation for request URIs.
pub trait UriExtension {
    /// Append `path` to this URI's path.
    ///
    /// The path is always placed underneath the existing one, whether or not either
    /// side carries a slash at the seam. Any query on `self` is dropped.
    fn join(&self, path: &str) -> Result<Uri, http::Error>;

    /// Set the query parameter `key` to `value`, keeping any other parameters.
    fn replace_query(&self, key: &str, value: &str) -> Result<Uri, http::Error>;
}

impl UriExtension for Uri {
    fn join(&self, path: &str) -> Result<Uri, http::Error> {
        let base = self.path().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        with_path_and_query(self, format!("{base}/{path}"))
    }

    fn replace_query(&self, key: &str, value: &str) -> Result<Uri, http::Error> {
        let kept = url::form_urlencoded::parse(self.query().unwrap_or_default().as_bytes())
            .filter(|(k, _)| k != key)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect::<Vec<_>>();

        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .append_pair(key, value)
            .finish();

        with_path_and_query(self, format!("{}?{query}", self.path()))
    }
}

fn with_path_and_query(uri: &Uri, path_and_query: String) -> Result<Uri, http::Error> {
    let mut builder = Uri::builder();
    if let Some(scheme) = uri.scheme() {
        builder = builder.scheme(scheme.clone());
    }
    if let Some(authority) = uri.authority() {
        builder = builder.authority(authority.clone());
    }
    builder.path_and_query(path_and_query).build()
}
