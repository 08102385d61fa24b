//! The registry protocol client.

use std::future::Future;
use std::sync::Arc;

use api_client::request::RequestBuilder;
use api_client::response::ApiResponse;
use api_client::{ApiClient, Credentials, Page};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt as _};
use http::{Method, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::blob::{BlobSizeCache, BlobSource};
use crate::catalog::{Catalog, TagList};
use crate::digest::Digest;
use crate::error::{Error, Remote};
use crate::manifest::{self, SCHEMA1_MEDIA_TYPES, SignedManifest, TagInfo};
use crate::options::{ClientOptions, LayerSizePolicy};
use crate::registry::Registry;
use crate::repository::{RepositoryName, path_segment};

const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// A client for the v2 HTTP API of one registry.
///
/// Cloning is cheap. Clones share the HTTP connection pool and the blob size cache.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    name: Arc<str>,
    url: Arc<str>,
    api: ApiClient<Credentials>,
    cache: BlobSizeCache,
    options: ClientOptions,
}

impl RegistryClient {
    /// Create a client which talks to the registry over the network.
    pub fn new(
        registry: &Registry,
        cache: BlobSizeCache,
        options: ClientOptions,
    ) -> Result<Self, Error> {
        registry.validate()?;
        let api = ApiClient::new(registry.base_uri()?, registry.credentials());
        Ok(Self::from_api(registry, api, cache, options))
    }

    /// Create a client which sends its requests through `service`.
    pub fn with_service<S>(
        registry: &Registry,
        cache: BlobSizeCache,
        options: ClientOptions,
        service: S,
    ) -> Result<Self, Error>
    where
        S: tower::Service<
                http::Request<hyperdriver::Body>,
                Response = http::Response<hyperdriver::Body>,
                Error = hyperdriver::client::Error,
            > + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        registry.validate()?;
        let api = ApiClient::new_with_inner_service(
            registry.base_uri()?,
            registry.credentials(),
            service,
        );
        Ok(Self::from_api(registry, api, cache, options))
    }

    fn from_api(
        registry: &Registry,
        api: ApiClient<Credentials>,
        cache: BlobSizeCache,
        options: ClientOptions,
    ) -> Self {
        RegistryClient {
            name: registry.name.as_str().into(),
            url: registry.url.as_str().into(),
            api: api.with_timeout(options.timeout),
            cache,
            options,
        }
    }

    /// The registry's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registry's base URL, as configured.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The blob size cache used by this client.
    pub fn cache(&self) -> &BlobSizeCache {
        &self.cache
    }

    /// The options this client was created with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Send a request, and turn any answer other than `200 OK` into an error.
    async fn fetch(
        &self,
        request: RequestBuilder<Credentials>,
        remote: Remote<'_>,
    ) -> Result<ApiResponse, Error> {
        tracing::debug!(
            registry = %self.name,
            operation = remote.operation,
            resource = remote.name,
            "registry request"
        );

        let response = request
            .send()
            .await
            .map_err(|error| remote.error(error))?
            .error_for_status()
            .await
            .map_err(|error| remote.error(error))?;

        if response.status() != StatusCode::OK {
            return Err(Error::Status {
                operation: remote.operation,
                resource: remote.name.to_owned(),
                status: response.status(),
                message: String::new(),
            });
        }
        Ok(response)
    }

    /// Request the API version endpoint, to see whether the registry is reachable.
    #[tracing::instrument(skip(self), fields(registry = %self.name))]
    pub async fn check(&self) -> Result<(), Error> {
        let remote = Remote::new("check api", "registry", &self.name);
        self.fetch(self.api.get("v2/"), remote).await?;
        Ok(())
    }

    /// One page of the repository catalog, with how the listing continues.
    ///
    /// A page size of zero lets the registry choose. An empty cursor starts at the beginning.
    pub async fn catalog_page(&self, n: usize, last: &str) -> Result<Page<String>, Error> {
        let remote = Remote::new("list repositories", "registry", &self.name);
        tracing::debug!(registry = %self.name, n, last, "listing repositories");

        self.api
            .page::<Catalog>(CATALOG, page_size(n), Some(last))
            .await
            .map_err(|error| remote.error(error))
    }

    /// One page of the repository catalog.
    pub async fn repositories_page(&self, n: usize, last: &str) -> Result<Vec<String>, Error> {
        Ok(self.catalog_page(n, last).await?.items)
    }

    /// Every repository in the catalog, as a stream.
    pub fn repository_stream(&self) -> impl Stream<Item = Result<String, Error>> + Send + use<> {
        let name = self.name.clone();
        self.api
            .paginate::<Catalog>(CATALOG, None)
            .max_pages(self.options.max_pages)
            .map_err(move |error| Remote::new("list repositories", "registry", &name).error(error))
    }

    /// Every repository in the catalog.
    #[tracing::instrument(skip(self), fields(registry = %self.name))]
    pub async fn repositories(&self) -> Result<Vec<String>, Error> {
        self.repository_stream().try_collect().await
    }

    /// One page of a repository's tags, with how the listing continues.
    pub async fn tag_list_page(
        &self,
        repository: &str,
        n: usize,
        last: &str,
    ) -> Result<Page<String>, Error> {
        let repository = RepositoryName::parse(repository)?;
        let remote = Remote::new("list tags", "repository", repository.as_str());
        tracing::debug!(registry = %self.name, %repository, n, last, "listing tags");

        self.api
            .page::<TagList>(&tags_path(&repository), page_size(n), Some(last))
            .await
            .map_err(|error| remote.error(error))
    }

    /// One page of a repository's tags.
    pub async fn tags_page(
        &self,
        repository: &str,
        n: usize,
        last: &str,
    ) -> Result<Vec<String>, Error> {
        Ok(self.tag_list_page(repository, n, last).await?.items)
    }

    /// Every tag of a repository, as a stream.
    pub fn tag_stream(
        &self,
        repository: &RepositoryName,
    ) -> impl Stream<Item = Result<String, Error>> + Send + use<> {
        let name = repository.clone();
        self.api
            .paginate::<TagList>(tags_path(repository), None)
            .max_pages(self.options.max_pages)
            .map_err(move |error| {
                Remote::new("list tags", "repository", name.as_str()).error(error)
            })
    }

    /// Every tag of a repository.
    #[tracing::instrument(skip(self), fields(registry = %self.name))]
    pub async fn tags(&self, repository: &str) -> Result<Vec<String>, Error> {
        let repository = RepositoryName::parse(repository)?;
        self.tags_of(&repository).await
    }

    pub(crate) async fn tags_of(&self, repository: &RepositoryName) -> Result<Vec<String>, Error> {
        self.tag_stream(repository).try_collect().await
    }

    /// Resolve the metadata of one tag.
    ///
    /// Fails on the first error, including a layer which cannot be sized, unless the
    /// client uses [`LayerSizePolicy::BestEffort`].
    #[tracing::instrument(skip(self), fields(registry = %self.name))]
    pub async fn tag(&self, repository: &str, tag: &str) -> Result<TagInfo, Error> {
        let repository = RepositoryName::parse(repository)?;
        self.tag_of(&repository, tag).await
    }

    pub(crate) async fn tag_of(
        &self,
        repository: &RepositoryName,
        tag: &str,
    ) -> Result<TagInfo, Error> {
        let reference = format!("{repository}:{tag}");
        if tag.is_empty() {
            return Err(Error::NotFound {
                kind: "tag",
                name: reference,
            });
        }

        let manifest = match self.resolve_tag(repository, tag, &reference).await {
            Ok((manifest_ref, media_type)) => {
                self.manifest(repository, &manifest_ref, &[media_type.as_str()], &reference)
                    .await?
            }
            Err(error @ (Error::Status { .. } | Error::Transport { .. })) => {
                tracing::warn!(
                    registry = %self.name,
                    reference,
                    %error,
                    "could not resolve tag with HEAD, fetching manifest by tag"
                );
                self.manifest(repository, tag, &SCHEMA1_MEDIA_TYPES, &reference)
                    .await?
            }
            Err(error) => return Err(error),
        };

        let compatibility = manifest
            .compatibility()
            .map_err(|message| Remote::new("parse manifest", "tag", &reference).decode(message))?;

        let size = self.layer_size(repository, &manifest).await?;
        Ok(TagInfo::new(compatibility, manifest.fs_layers.len(), size))
    }

    /// Ask the registry which manifest a tag points at.
    ///
    /// Returns the reference to fetch the manifest by (its digest, or the tag itself when
    /// the registry does not say) and its media type.
    async fn resolve_tag(
        &self,
        repository: &RepositoryName,
        tag: &str,
        reference: &str,
    ) -> Result<(String, String), Error> {
        let remote = Remote::new("resolve tag", "tag", reference);
        let request = self
            .api
            .request_path(Method::HEAD, &manifest_path(repository, tag))
            .accept(SCHEMA1_MEDIA_TYPES);
        let response = self.fetch(request, remote).await?;

        let media_type = response
            .header_str(http::header::CONTENT_TYPE)
            .map(manifest::media_type)
            .filter(|media_type| !media_type.is_empty())
            .unwrap_or(manifest::MEDIA_TYPE_SIGNED)
            .to_owned();

        if !manifest::is_schema1(&media_type) {
            return Err(Error::UnsupportedManifest {
                resource: reference.to_owned(),
                media_type,
            });
        }

        let digest = match response.header_str(DOCKER_CONTENT_DIGEST) {
            Some(value) => match value.trim().parse::<Digest>() {
                Ok(digest) => Some(digest),
                Err(error) => {
                    tracing::warn!(reference, %error, "ignoring invalid content digest");
                    None
                }
            },
            None => None,
        };

        match digest {
            Some(digest) => Ok((digest.to_string(), media_type)),
            None => {
                tracing::debug!(reference, "no content digest, fetching manifest by tag");
                Ok((tag.to_owned(), media_type))
            }
        }
    }

    /// Fetch a manifest, accepting any of `media_types`.
    async fn manifest(
        &self,
        repository: &RepositoryName,
        manifest_ref: &str,
        media_types: &[&str],
        reference: &str,
    ) -> Result<SignedManifest, Error> {
        let remote = Remote::new("fetch manifest", "manifest", reference);
        let request = self
            .api
            .request_path(Method::GET, &manifest_path(repository, manifest_ref))
            .accept(media_types);

        let response = self.fetch(request, remote).await?;
        if let Some(media_type) = response
            .header_str(http::header::CONTENT_TYPE)
            .map(manifest::media_type)
            .filter(|media_type| !media_type.is_empty())
        {
            if !manifest::is_schema1(media_type) {
                return Err(Error::UnsupportedManifest {
                    resource: reference.to_owned(),
                    media_type: media_type.to_owned(),
                });
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| remote.error(error))?;

        let manifest = SignedManifest::from_slice(&body).map_err(|error| remote.decode(error))?;
        match manifest.schema_version {
            Some(1) | None => Ok(manifest),
            Some(version) => Err(Error::UnsupportedManifest {
                resource: reference.to_owned(),
                media_type: format!("schemaVersion {version}"),
            }),
        }
    }

    /// Sum the sizes of every layer, going through the blob size cache.
    async fn layer_size(
        &self,
        repository: &RepositoryName,
        manifest: &SignedManifest,
    ) -> Result<Option<u64>, Error> {
        let blobs = RepositoryBlobs {
            client: self,
            repository,
        };

        let mut total: u64 = 0;
        for layer in &manifest.fs_layers {
            match self.cache.size_of(&blobs, &layer.blob_sum).await {
                Ok(size) => total = total.saturating_add(size),
                Err(error) => match self.options.layer_size_policy {
                    LayerSizePolicy::Strict => return Err(error),
                    LayerSizePolicy::BestEffort => {
                        tracing::warn!(
                            registry = %self.name,
                            %repository,
                            digest = %layer.blob_sum,
                            %error,
                            "could not size layer, reporting unknown size"
                        );
                        return Ok(None);
                    }
                },
            }
        }

        Ok(Some(total))
    }

    /// The size of one blob in a repository, going through the blob size cache.
    pub async fn blob_size(&self, repository: &str, digest: &str) -> Result<u64, Error> {
        let repository = RepositoryName::parse(repository)?;
        let digest = digest.parse::<Digest>()?;
        let blobs = RepositoryBlobs {
            client: self,
            repository: &repository,
        };
        self.cache.size_of(&blobs, &digest).await
    }
}

/// Blobs of one repository, sized with `HEAD /v2/{repository}/blobs/{digest}`.
#[derive(Debug)]
struct RepositoryBlobs<'a> {
    client: &'a RegistryClient,
    repository: &'a RepositoryName,
}

#[async_trait]
impl<'a> BlobSource for RepositoryBlobs<'a> {
    async fn blob_size(&self, digest: &Digest) -> Result<u64, Error> {
        let remote = Remote::new("size blob", "blob", digest.as_str());
        let path = format!("v2/{}/blobs/{}", self.repository.to_path(), digest);

        let response = self
            .client
            .fetch(self.client.api.request_path(Method::HEAD, &path), remote)
            .await?;

        response
            .content_length()
            .ok_or_else(|| remote.decode("missing or invalid Content-Length"))
    }
}

const CATALOG: &str = "v2/_catalog";

fn tags_path(repository: &RepositoryName) -> String {
    format!("v2/{}/tags/list", repository.to_path())
}

fn manifest_path(repository: &RepositoryName, reference: &str) -> String {
    format!(
        "v2/{}/manifests/{}",
        repository.to_path(),
        path_segment(reference)
    )
}

fn page_size(n: usize) -> Option<usize> {
    (n > 0).then_some(n)
}

/// Run `future` until it finishes or `token` is cancelled, whichever comes first.
///
/// A cancelled future is dropped, which abandons any request it had in flight.
pub async fn cancellable<F, T>(token: &CancellationToken, future: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}

#[cfg(test)]
mod tests {
    use api_client::mock::MockService;
    use http::{HeaderMap, HeaderValue, StatusCode};

    use super::*;

    fn client(mock: &MockService, options: ClientOptions) -> RegistryClient {
        RegistryClient::with_service(
            &Registry::new("local", "http://registry.test"),
            BlobSizeCache::new(),
            options,
            mock.clone(),
        )
        .unwrap()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn page_sizes() {
        assert_eq!(page_size(0), None);
        assert_eq!(page_size(5), Some(5));
    }

    #[tokio::test]
    async fn check_requests_api_root() {
        let mut mock = MockService::new();
        mock.add_json("/v2/", &serde_json::json!({}));
        let client = client(&mock, ClientOptions::default());

        client.check().await.unwrap();
        assert_eq!(mock.count(&Method::GET, "/v2/"), 1);
        assert_eq!(client.name(), "local");
        assert_eq!(client.url(), "http://registry.test");
    }

    #[tokio::test]
    async fn unsupported_media_type() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/demo/manifests/v2",
            StatusCode::OK,
            headers(&[(
                "content-type",
                "application/vnd.docker.distribution.manifest.v2+json",
            )]),
            Vec::new(),
        );
        let client = client(&mock, ClientOptions::default());

        let error = client.tag("demo", "v2").await.unwrap_err();
        assert!(matches!(error, Error::UnsupportedManifest { .. }), "{error}");
        assert_eq!(mock.count(&Method::GET, "/v2/demo/manifests/v2"), 0);
    }

    #[tokio::test]
    async fn missing_digest_falls_back_to_tag() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/demo/manifests/v1",
            StatusCode::OK,
            HeaderMap::new(),
            serde_json::json!({
                "schemaVersion": 1,
                "fsLayers": [],
                "history": [{"v1Compatibility": "{\"created\": \"2024-01-01T00:00:00Z\"}"}],
            })
            .to_string(),
        );
        let client = client(&mock, ClientOptions::default());

        let info = client.tag("demo", "v1").await.unwrap();
        assert_eq!(info.layers, 0);
        assert_eq!(info.size, Some(0));

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].method, Method::HEAD);
        assert_eq!(calls[1].method, Method::GET);
        assert_eq!(calls[1].uri.path(), "/v2/demo/manifests/v1");
    }

    #[tokio::test]
    async fn newer_schema_version_is_unsupported() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/demo/manifests/v1",
            StatusCode::OK,
            headers(&[("content-type", "application/json")]),
            serde_json::json!({"schemaVersion": 2, "layers": []}).to_string(),
        );
        let client = client(&mock, ClientOptions::default());

        let error = client.tag("demo", "v1").await.unwrap_err();
        assert!(matches!(error, Error::UnsupportedManifest { .. }), "{error}");
    }

    #[tokio::test]
    async fn missing_tag_is_not_found() {
        let mock = MockService::new();
        let client = client(&mock, ClientOptions::default());

        let error = client.tag("demo", "nope").await.unwrap_err();
        assert!(error.is_not_found(), "{error}");
        assert_eq!(error.to_string(), "tag not found: demo:nope");
        assert_eq!(mock.count(&Method::GET, "/v2/demo/manifests/nope"), 0);
    }

    fn manifest_body() -> String {
        serde_json::json!({
            "schemaVersion": 1,
            "fsLayers": [{"blobSum": "sha256:aaa"}],
            "history": [{"v1Compatibility": "{\"created\": \"2024-01-01T00:00:00Z\"}"}],
        })
        .to_string()
    }

    #[tokio::test]
    async fn rejected_head_falls_back_to_get() {
        let mut mock = MockService::new();
        mock.add_for(
            Method::HEAD,
            "/v2/demo/manifests/v1",
            StatusCode::METHOD_NOT_ALLOWED,
            HeaderMap::new(),
            Vec::new(),
        );
        mock.add_for(
            Method::GET,
            "/v2/demo/manifests/v1",
            StatusCode::OK,
            headers(&[("content-type", manifest::MEDIA_TYPE_SIGNED)]),
            manifest_body(),
        );
        mock.add(
            "/v2/demo/blobs/sha256:aaa",
            StatusCode::OK,
            headers(&[("content-length", "100")]),
            Vec::new(),
        );
        let client = client(&mock, ClientOptions::default());

        let info = client.tag("demo", "v1").await.unwrap();
        assert_eq!(info.layers, 1);
        assert_eq!(info.size, Some(100));

        let calls = mock.calls();
        assert_eq!(calls[0].method, Method::HEAD);
        assert_eq!(calls[1].method, Method::GET);
        assert_eq!(calls[1].uri.path(), "/v2/demo/manifests/v1");
    }

    #[tokio::test]
    async fn fallback_still_checks_the_media_type() {
        let mut mock = MockService::new();
        mock.add_for(
            Method::HEAD,
            "/v2/demo/manifests/v1",
            StatusCode::METHOD_NOT_ALLOWED,
            HeaderMap::new(),
            Vec::new(),
        );
        mock.add_for(
            Method::GET,
            "/v2/demo/manifests/v1",
            StatusCode::OK,
            headers(&[(
                "content-type",
                "application/vnd.docker.distribution.manifest.v2+json",
            )]),
            serde_json::json!({"schemaVersion": 2}).to_string(),
        );
        let client = client(&mock, ClientOptions::default());

        let error = client.tag("demo", "v1").await.unwrap_err();
        assert!(matches!(error, Error::UnsupportedManifest { .. }), "{error}");
    }

    #[tokio::test]
    async fn blob_size_needs_ok() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/demo/blobs/sha256:aaa",
            StatusCode::NO_CONTENT,
            headers(&[("content-length", "100")]),
            Vec::new(),
        );
        let client = client(&mock, ClientOptions::default());

        let error = client.blob_size("demo", "sha256:aaa").await.unwrap_err();
        assert!(
            matches!(
                error,
                Error::Status {
                    status: StatusCode::NO_CONTENT,
                    ..
                }
            ),
            "{error}"
        );
        assert!(client.cache().is_empty());
    }

    #[test]
    fn options_are_kept() {
        let mock = MockService::new();
        let options = ClientOptions {
            layer_size_policy: LayerSizePolicy::BestEffort,
            max_pages: 7,
            ..ClientOptions::default()
        };
        let client = client(&mock, options);

        assert_eq!(client.options().layer_size_policy, LayerSizePolicy::BestEffort);
        assert_eq!(client.options().max_pages, 7);
    }

    #[tokio::test]
    async fn blob_size_needs_content_length() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/demo/blobs/sha256:aaa",
            StatusCode::OK,
            headers(&[("content-length", "100")]),
            Vec::new(),
        );
        mock.add(
            "/v2/demo/blobs/sha256:bbb",
            StatusCode::OK,
            HeaderMap::new(),
            Vec::new(),
        );
        let client = client(&mock, ClientOptions::default());

        assert_eq!(client.blob_size("demo", "sha256:aaa").await.unwrap(), 100);
        assert!(matches!(
            client.blob_size("demo", "sha256:bbb").await,
            Err(Error::Decode { .. })
        ));
        assert!(matches!(
            client.blob_size("demo", "aaa").await,
            Err(Error::InvalidDigest(_))
        ));
    }

    #[tokio::test]
    async fn timeouts_are_reported() {
        let mut mock = MockService::new();
        mock.add_json("/v2/", &serde_json::json!({}));
        let mock = mock.with_delay(std::time::Duration::from_secs(5));

        let options = ClientOptions {
            timeout: Some(std::time::Duration::from_millis(10)),
            ..ClientOptions::default()
        };
        let client = client(&mock, options);

        let error = client.check().await.unwrap_err();
        assert!(matches!(error, Error::Timeout { .. }), "{error}");
    }

    #[tokio::test]
    async fn cancellation() {
        let mut mock = MockService::new();
        mock.add_json("/v2/_catalog", &serde_json::json!({"repositories": ["demo"]}));
        let mock = mock.with_delay(std::time::Duration::from_secs(5));
        let client = client(&mock, ClientOptions::default());

        let token = CancellationToken::new();
        token.cancel();
        let error = cancellable(&token, client.repositories()).await.unwrap_err();
        assert!(matches!(error, Error::Cancelled));

        let token = CancellationToken::new();
        let fast = cancellable(&token, async { Ok::<_, Error>(7) }).await.unwrap();
        assert_eq!(fast, 7);
    }
}
