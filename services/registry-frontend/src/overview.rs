//! Bulk views over a registry.
//!
//! An overview keeps going when single entries fail: the failing rows are reported with
//! unknown values instead of failing the whole listing.

use chrono::{DateTime, Utc};
use futures::StreamExt as _;
use serde::Serialize;

use crate::client::RegistryClient;
use crate::error::Error;
use crate::manifest::TagInfo;
use crate::repository::RepositoryName;

/// One registry, as shown in a list of registries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrySummary {
    /// Registry name.
    pub name: String,

    /// Registry base URL.
    pub url: String,

    /// Whether the catalog could be listed.
    pub online: bool,

    /// Number of repositories, when known.
    pub repositories: Option<usize>,
}

/// One repository, as shown in a list of repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositorySummary {
    /// Repository name.
    pub name: String,

    /// Number of tags, when known.
    pub tags: Option<usize>,
}

/// One tag, as shown in a list of tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagSummary {
    /// Tag name.
    pub tag: String,

    /// When the image was built.
    pub created: Option<DateTime<Utc>>,

    /// Number of layers.
    pub layers: Option<usize>,

    /// Total compressed size in bytes. `None` is shown as "unknown".
    pub size: Option<u64>,

    /// Why the tag could not be resolved.
    pub error: Option<String>,
}

impl TagSummary {
    fn resolved(tag: String, info: &TagInfo) -> Self {
        TagSummary {
            tag,
            created: Some(info.created),
            layers: Some(info.layers),
            size: info.size,
            error: None,
        }
    }

    fn failed(tag: String, error: &Error) -> Self {
        TagSummary {
            tag,
            created: None,
            layers: None,
            size: None,
            error: Some(error.to_string()),
        }
    }
}

impl RegistryClient {
    /// Resolve many tags of one repository, at most `concurrency` at a time.
    ///
    /// Returns one entry per tag, in the order given. Tags which fail to resolve are
    /// reported with an unknown size and the error message.
    pub async fn summarize_tags<I>(
        &self,
        repository: &str,
        tags: I,
        concurrency: usize,
    ) -> Vec<TagSummary>
    where
        I: IntoIterator<Item = String>,
    {
        match RepositoryName::parse(repository) {
            Ok(repository) => self.summarize(&repository, tags, concurrency).await,
            Err(error) => tags
                .into_iter()
                .map(|tag| TagSummary::failed(tag, &error))
                .collect(),
        }
    }

    async fn summarize<I>(
        &self,
        repository: &RepositoryName,
        tags: I,
        concurrency: usize,
    ) -> Vec<TagSummary>
    where
        I: IntoIterator<Item = String>,
    {
        futures::stream::iter(tags)
            .map(|tag| async move {
                match self.tag_of(repository, &tag).await {
                    Ok(info) => TagSummary::resolved(tag, &info),
                    Err(error) => {
                        tracing::warn!(
                            registry = self.name(),
                            %repository,
                            tag = %tag,
                            %error,
                            "could not resolve tag"
                        );
                        TagSummary::failed(tag, &error)
                    }
                }
            })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// Every tag of a repository with its metadata.
    ///
    /// Fails only when the tags cannot be listed.
    #[tracing::instrument(skip(self), fields(registry = self.name()))]
    pub async fn tag_overview(
        &self,
        repository: &str,
        concurrency: usize,
    ) -> Result<Vec<TagSummary>, Error> {
        let repository = RepositoryName::parse(repository)?;
        let tags = self.tags_of(&repository).await?;
        Ok(self.summarize(&repository, tags, concurrency).await)
    }

    /// Every repository with its number of tags.
    ///
    /// Fails only when the catalog cannot be listed.
    #[tracing::instrument(skip(self), fields(registry = self.name()))]
    pub async fn repository_overview(
        &self,
        concurrency: usize,
    ) -> Result<Vec<RepositorySummary>, Error> {
        let repositories = self.repositories().await?;

        Ok(futures::stream::iter(repositories)
            .map(|name| async move {
                let listed = match RepositoryName::decoded(&name) {
                    Ok(repository) => self.tags_of(&repository).await,
                    Err(error) => Err(error),
                };
                let tags = match listed {
                    Ok(tags) => Some(tags.len()),
                    Err(error) => {
                        tracing::warn!(
                            registry = self.name(),
                            repository = %name,
                            %error,
                            "could not list tags"
                        );
                        None
                    }
                };
                RepositorySummary { name, tags }
            })
            .buffered(concurrency.max(1))
            .collect()
            .await)
    }

    /// This registry as a row of the registry overview. Never fails.
    pub async fn summary(&self) -> RegistrySummary {
        let repositories = match self.repositories().await {
            Ok(repositories) => Some(repositories.len()),
            Err(error) => {
                tracing::warn!(registry = self.name(), %error, "registry is offline");
                None
            }
        };

        RegistrySummary {
            name: self.name().to_owned(),
            url: self.url().to_owned(),
            online: repositories.is_some(),
            repositories,
        }
    }
}

#[cfg(test)]
mod tests {
    use api_client::mock::MockService;
    use http::{HeaderMap, Method, StatusCode};

    use super::*;
    use crate::blob::BlobSizeCache;
    use crate::options::ClientOptions;
    use crate::registry::Registry;

    fn client(mock: &MockService) -> RegistryClient {
        RegistryClient::with_service(
            &Registry::new("local", "http://registry.test"),
            BlobSizeCache::new(),
            ClientOptions::default(),
            mock.clone(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn repository_overview_tolerates_missing_tags() {
        let mut mock = MockService::new();
        mock.add_json(
            "/v2/_catalog",
            &serde_json::json!({"repositories": ["demo", "gone"]}),
        );
        mock.add_json(
            "/v2/demo/tags/list",
            &serde_json::json!({"name": "demo", "tags": ["v1", "v2"]}),
        );
        mock.add(
            "/v2/gone/tags/list",
            StatusCode::INTERNAL_SERVER_ERROR,
            HeaderMap::new(),
            "boom",
        );

        let overview = client(&mock).repository_overview(4).await.unwrap();
        assert_eq!(
            overview,
            vec![
                RepositorySummary {
                    name: "demo".into(),
                    tags: Some(2)
                },
                RepositorySummary {
                    name: "gone".into(),
                    tags: None
                },
            ]
        );
    }

    #[tokio::test]
    async fn offline_registry_summary() {
        let mock = MockService::new();
        let summary = client(&mock).summary().await;
        assert_eq!(
            summary,
            RegistrySummary {
                name: "local".into(),
                url: "http://registry.test".into(),
                online: false,
                repositories: None,
            }
        );
        assert_eq!(mock.count(&Method::GET, "/v2/_catalog"), 1);
    }

    #[tokio::test]
    async fn names_are_decoded_once() {
        let mut mock = MockService::new();
        mock.add_json(
            "/v2/_catalog",
            &serde_json::json!({"repositories": ["lib%41"]}),
        );
        mock.add_json(
            "/v2/lib%2541/tags/list",
            &serde_json::json!({"name": "lib%41", "tags": ["v1"]}),
        );
        mock.add(
            "/v2/lib%2541/manifests/v1",
            StatusCode::OK,
            HeaderMap::new(),
            serde_json::json!({
                "schemaVersion": 1,
                "fsLayers": [],
                "history": [{"v1Compatibility": "{\"created\": \"2024-01-01T00:00:00Z\"}"}],
            })
            .to_string(),
        );
        let client = client(&mock);

        let overview = client.tag_overview("lib%2541", 2).await.unwrap();
        assert_eq!(overview.len(), 1);
        assert_eq!(overview[0].error, None);
        assert_eq!(overview[0].size, Some(0));

        let summaries = client
            .summarize_tags("lib%2541", vec!["v1".to_owned()], 1)
            .await;
        assert_eq!(summaries[0].error, None);

        let repositories = client.repository_overview(1).await.unwrap();
        assert_eq!(
            repositories,
            vec![RepositorySummary {
                name: "lib%41".into(),
                tags: Some(1)
            }]
        );
        assert_eq!(mock.count(&Method::GET, "/v2/libA/tags/list"), 0);
    }

    #[tokio::test]
    async fn zero_concurrency_still_makes_progress() {
        let mock = MockService::new();
        let summaries = client(&mock)
            .summarize_tags("demo", vec!["v1".to_owned()], 0)
            .await;
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].error.is_some());
        assert_eq!(summaries[0].size, None);
    }
}
