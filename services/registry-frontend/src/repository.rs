//! Repository names and their place in request paths.
//!
//! Nested repositories such as `team/app` are often passed around percent-encoded
//! (`team%2Fapp`) so that they fit in a single path segment of a frontend URL. They are
//! decoded once, when parsed, and re-encoded one segment at a time when placed in a
//! registry API path.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::error::Error;

/// Characters escaped inside a single path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A decoded repository name, such as `library/nginx`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryName(String);

impl RepositoryName {
    /// Parse a repository name which may be percent-encoded.
    pub fn parse(name: &str) -> Result<Self, Error> {
        let decoded = percent_decode_str(name)
            .decode_utf8()
            .map_err(|_| Error::InvalidRepository(name.to_owned()))?;

        Self::decoded(&decoded).map_err(|_| Error::InvalidRepository(name.to_owned()))
    }

    /// Take a name exactly as given, such as one listed by the registry's catalog.
    pub fn decoded(name: &str) -> Result<Self, Error> {
        let valid = !name.is_empty()
            && name
                .split('/')
                .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
        if !valid {
            return Err(Error::InvalidRepository(name.to_owned()));
        }

        Ok(RepositoryName(name.to_owned()))
    }

    /// The decoded name, usable as a lookup key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as it appears in a request path, each segment escaped.
    pub fn to_path(&self) -> String {
        self.0
            .split('/')
            .map(path_segment)
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Escape a value for use as one path segment.
pub(crate) fn path_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

impl FromStr for RepositoryName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RepositoryName::parse(s)
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RepositoryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
