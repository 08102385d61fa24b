//! Error types for the registry frontend

use http::StatusCode;

/// Result type for registry frontend operations
pub type RegistryResult<T> = Result<T, Error>;

/// Error types for registry frontend operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request never produced a usable response
    #[error("{operation} {resource}: {source}")]
    Transport {
        /// What we were doing
        operation: &'static str,
        /// What we were doing it to
        resource: String,
        /// Underlying client error
        #[source]
        source: api_client::Error,
    },

    /// The registry answered with an unexpected status
    #[error("{operation} {resource}: registry answered {status}")]
    Status {
        /// What we were doing
        operation: &'static str,
        /// What we were doing it to
        resource: String,
        /// HTTP status of the response
        status: StatusCode,
        /// Response body, if the registry sent one
        message: String,
    },

    /// The registry answered with something we could not understand
    #[error("{operation} {resource}: {message}")]
    Decode {
        /// What we were doing
        operation: &'static str,
        /// What we were doing it to
        resource: String,
        /// What went wrong
        message: String,
    },

    /// The registry does not know about a resource
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Kind of resource, e.g. `repository` or `tag`
        kind: &'static str,
        /// Name of the resource
        name: String,
    },

    /// The registry did not answer in time
    #[error("{operation} {resource}: timed out")]
    Timeout {
        /// What we were doing
        operation: &'static str,
        /// What we were doing it to
        resource: String,
    },

    /// The caller gave up on the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Registry names may only hold ASCII letters, digits, `-` and `_`
    #[error("illegal character in registry name: {0:?}")]
    IllegalName(String),

    /// Registry URL could not be used as a base URL
    #[error("invalid registry url {url:?}: {message}")]
    InvalidUrl {
        /// The URL as given
        url: String,
        /// What is wrong with it
        message: String,
    },

    /// Invalid digest format
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// Invalid repository name
    #[error("invalid repository name: {0}")]
    InvalidRepository(String),

    /// The manifest is not a schema 1 manifest
    #[error("unsupported manifest for {resource}: {media_type}")]
    UnsupportedManifest {
        /// The manifest reference
        resource: String,
        /// Media type or schema version the registry offered
        media_type: String,
    },
}

impl Error {
    /// Get the HTTP status code a frontend should answer with for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::IllegalName(_)
            | Error::InvalidUrl { .. }
            | Error::InvalidDigest(_)
            | Error::InvalidRepository(_) => StatusCode::BAD_REQUEST,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Error::Transport { .. }
            | Error::Status { .. }
            | Error::Decode { .. }
            | Error::UnsupportedManifest { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// True when the registry reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Describes one remote call, so that failures can say what they were about.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Remote<'a> {
    pub(crate) operation: &'static str,
    pub(crate) kind: &'static str,
    pub(crate) name: &'a str,
}

impl<'a> Remote<'a> {
    pub(crate) fn new(operation: &'static str, kind: &'static str, name: &'a str) -> Self {
        Self {
            operation,
            kind,
            name,
        }
    }

    /// Classify an error from the API client.
    pub(crate) fn error(&self, error: api_client::Error) -> Error {
        let resource = self.name.to_owned();
        match error {
            api_client::Error::Response(response) if response.status == StatusCode::NOT_FOUND => {
                Error::NotFound {
                    kind: self.kind,
                    name: resource,
                }
            }
            api_client::Error::Response(response) => Error::Status {
                operation: self.operation,
                resource,
                status: response.status,
                message: response.message,
            },
            api_client::Error::Decode(error) => Error::Decode {
                operation: self.operation,
                resource,
                message: error.to_string(),
            },
            api_client::Error::Timeout => Error::Timeout {
                operation: self.operation,
                resource,
            },
            source => Error::Transport {
                operation: self.operation,
                resource,
                source,
            },
        }
    }

    /// A response which arrived but made no sense.
    pub(crate) fn decode<M: std::fmt::Display>(&self, message: M) -> Error {
        Error::Decode {
            operation: self.operation,
            resource: self.name.to_owned(),
            message: message.to_string(),
        }
    }
}
