//! Content addressed identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A content digest such as `sha256:5891b5b5...`.
///
/// Digests name immutable content, so two equal digests always refer to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    value: String,
    split: usize,
}

impl Digest {
    /// The algorithm part, e.g. `sha256`.
    pub fn algorithm(&self) -> &str {
        &self.value[..self.split]
    }

    /// The encoded hash.
    pub fn encoded(&self) -> &str {
        &self.value[self.split + 1..]
    }

    /// The digest as `algorithm:encoded`.
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

fn valid_algorithm(algorithm: &str) -> bool {
    // Components of [a-z0-9]+ joined by single separators.
    !algorithm.is_empty()
        && algorithm
            .split(['+', '.', '_', '-'])
            .all(|component| {
                !component.is_empty()
                    && component
                        .bytes()
                        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
            })
}

fn valid_encoded(encoded: &str) -> bool {
    !encoded.is_empty()
        && encoded
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'=' | b'_' | b'-'))
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((algorithm, encoded)) = s.split_once(':') else {
            return Err(Error::InvalidDigest(s.to_owned()));
        };

        if !valid_algorithm(algorithm) || !valid_encoded(encoded) {
            return Err(Error::InvalidDigest(s.to_owned()));
        }

        Ok(Digest {
            value: s.to_owned(),
            split: algorithm.len(),
        })
    }
}

impl TryFrom<String> for Digest {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.value
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_digest() {
        let digest: Digest = "sha256:aaa".parse().unwrap();
        assert_eq!(digest.algorithm(), "sha256");
        assert_eq!(digest.encoded(), "aaa");
        assert_eq!(digest.to_string(), "sha256:aaa");

        let digest: Digest = "multihash+base58:QmRZxt2b1FVZPNqd8hsiykDL3TdBDeTSPX9Kv46HmX4Gx8"
            .parse()
            .unwrap();
        assert_eq!(digest.algorithm(), "multihash+base58");
    }

    #[test]
    fn reject_invalid_digests() {
        for invalid in [
            "",
            "sha256",
            "sha256:",
            ":abc",
            "SHA256:abc",
            "sha256+:abc",
            "sha256:abc/def",
            "sha256:a b",
        ] {
            assert!(
                matches!(invalid.parse::<Digest>(), Err(Error::InvalidDigest(_))),
                "{invalid:?} should be rejected"
            );
        }
    }

    #[test]
    fn digest_serde_is_a_plain_string() {
        let digest: Digest = serde_json::from_str("\"sha256:bbb\"").unwrap();
        assert_eq!(digest.encoded(), "bbb");
        assert!(serde_json::from_str::<Digest>("\"bbb\"").is_err());
    }
}
