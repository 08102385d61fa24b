//! Response bodies of the listing endpoints.

use api_client::Paginator;
use serde::Deserialize;

/// A page of `GET /v2/_catalog`.
#[derive(Debug, Deserialize)]
pub(crate) struct Catalog {
    #[serde(default)]
    repositories: Option<Vec<String>>,
}

impl Paginator for Catalog {
    type Item = String;

    fn items(self) -> Vec<String> {
        self.repositories.unwrap_or_default()
    }

    fn cursor(item: &String) -> &str {
        item
    }
}

/// A page of `GET /v2/{repository}/tags/list`.
#[derive(Debug, Deserialize)]
pub(crate) struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl Paginator for TagList {
    type Item = String;

    fn items(self) -> Vec<String> {
        self.tags.unwrap_or_default()
    }

    fn cursor(item: &String) -> &str {
        item
    }
}
