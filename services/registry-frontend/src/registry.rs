//! Registry endpoints.

use api_client::Credentials;
use api_client::uri::IntoUri as _;
use http::Uri;
use secret::Secret;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A remote registry endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Registry {
    /// Name shown to operators. Restricted to ASCII letters, digits, `-` and `_`.
    pub name: String,

    /// Base URL of the registry, below which the `v2/` API lives.
    pub url: String,

    /// Username for basic authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Password for basic authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
}

impl Registry {
    /// An anonymous registry.
    pub fn new<N, U>(name: N, url: U) -> Self
    where
        N: Into<String>,
        U: Into<String>,
    {
        Registry {
            name: name.into(),
            url: url.into(),
            user: None,
            password: None,
        }
    }

    /// Authenticate with HTTP basic credentials.
    pub fn with_basic_auth<U, P>(mut self, user: U, password: Option<P>) -> Self
    where
        U: Into<String>,
        P: Into<Secret>,
    {
        self.user = Some(user.into());
        self.password = password.map(Into::into);
        self
    }

    /// Check the name and URL.
    pub fn validate(&self) -> Result<(), Error> {
        validate_name(&self.name)?;
        self.base_uri()?;
        Ok(())
    }

    /// The parsed base URL.
    pub fn base_uri(&self) -> Result<Uri, Error> {
        let invalid = |message: String| Error::InvalidUrl {
            url: self.url.clone(),
            message,
        };

        let uri = self
            .url
            .as_str()
            .into_uri()
            .map_err(|error| invalid(error.to_string()))?;

        match uri.scheme_str() {
            Some("http" | "https") => Ok(uri),
            Some(scheme) => Err(invalid(format!("unsupported scheme {scheme}"))),
            None => Err(invalid("missing scheme".to_owned())),
        }
    }

    /// The credentials attached to requests for this registry.
    pub fn credentials(&self) -> Credentials {
        Credentials::from_parts(self.user.clone(), self.password.clone())
    }
}

/// Check that a registry name holds only ASCII letters, digits, `-` and `_`.
pub fn validate_name(name: &str) -> Result<(), Error> {
    let legal = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if legal {
        Ok(())
    } else {
        Err(Error::IllegalName(name.to_owned()))
    }
}
