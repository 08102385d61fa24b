//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// What to do when the size of one layer cannot be determined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerSizePolicy {
    /// Fail the whole tag resolution.
    #[default]
    Strict,

    /// Report the tag with an unknown size.
    BestEffort,
}

/// Options shared by every client created from a store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Deadline for each request sent to a registry.
    #[serde(rename = "timeout_secs", deserialize_with = "seconds")]
    pub timeout: Option<Duration>,

    /// How layer sizing failures affect a tag.
    pub layer_size_policy: LayerSizePolicy,

    /// Upper bound on the number of pages fetched when listing everything.
    pub max_pages: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            layer_size_policy: LayerSizePolicy::default(),
            max_pages: api_client::DEFAULT_MAX_PAGES,
        }
    }
}

fn seconds<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let seconds = Option::<u64>::deserialize(deserializer)?;
    Ok(seconds.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.timeout, None);
        assert_eq!(options.layer_size_policy, LayerSizePolicy::Strict);
        assert_eq!(options.max_pages, 10_000);
    }

    #[test]
    fn options_from_json() {
        let options: ClientOptions = serde_json::from_str(
            r#"{"timeout_secs": 5, "layer_size_policy": "best-effort"}"#,
        )
        .unwrap();
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.layer_size_policy, LayerSizePolicy::BestEffort);
        assert_eq!(options.max_pages, 10_000);

        let options: ClientOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ClientOptions::default());
    }
}
