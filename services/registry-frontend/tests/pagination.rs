//! Property-based tests for listing repositories and tags page by page.

use api_client::mock::{MockService, next_link};
use proptest::prelude::*;
use registry_frontend::{BlobSizeCache, ClientOptions, Registry, RegistryClient};

/// Strategy for a sorted listing of unique names, and the page sizes a server cuts it into.
fn listing_strategy() -> impl Strategy<Value = (Vec<String>, Vec<usize>)> {
    (
        prop::collection::btree_set("[a-z0-9]{1,8}", 0..40),
        prop::collection::vec(1usize..6, 1..8),
    )
        .prop_map(|(names, sizes)| (names.into_iter().collect(), sizes))
}

/// Cut `names` into pages, cycling through `sizes`. An empty listing is one empty page.
fn split(names: &[String], sizes: &[usize]) -> Vec<Vec<String>> {
    let mut pages = Vec::new();
    let mut rest = names;
    while !rest.is_empty() {
        let size = sizes[pages.len() % sizes.len()].min(rest.len());
        let (page, tail) = rest.split_at(size);
        pages.push(page.to_vec());
        rest = tail;
    }

    if pages.is_empty() {
        pages.push(Vec::new());
    }
    pages
}

/// Serve `pages` from `path`, each one but the last linking to the next.
fn serve(path: &str, key: &str, pages: &[Vec<String>]) -> MockService {
    let mut mock = MockService::new();
    let mut query = String::new();

    for (index, page) in pages.iter().enumerate() {
        let body = serde_json::json!({ key: page });
        let target = format!("{path}{query}");
        match page.last() {
            Some(last) if index + 1 < pages.len() => {
                mock.add_json_with_headers(
                    &target,
                    &body,
                    next_link(&format!("{path}?last={last}")),
                );
                query = format!("?last={last}");
            }
            _ => mock.add_json(&target, &body),
        }
    }
    mock
}

fn client(mock: &MockService) -> RegistryClient {
    RegistryClient::with_service(
        &Registry::new("local", "http://registry.test"),
        BlobSizeCache::new(),
        ClientOptions::default(),
        mock.clone(),
    )
    .unwrap()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// The `last` query each request carried, in order.
fn cursors(mock: &MockService) -> Vec<Option<String>> {
    mock.calls()
        .iter()
        .map(|call| {
            call.uri
                .query()
                .and_then(|query| query.strip_prefix("last="))
                .map(str::to_owned)
        })
        .collect()
}

/// The cursor every request should carry: none, then the final item of each page.
fn expected_cursors(pages: &[Vec<String>]) -> Vec<Option<String>> {
    std::iter::once(None)
        .chain(
            pages
                .iter()
                .take(pages.len() - 1)
                .map(|page| page.last().cloned()),
        )
        .collect()
}

proptest! {
    /// Listing the catalog yields every repository once, in order, one request per page.
    #[test]
    fn catalog_listing_is_complete((names, sizes) in listing_strategy()) {
        let pages = split(&names, &sizes);
        let mock = serve("/v2/_catalog", "repositories", &pages);

        let listed = runtime().block_on(client(&mock).repositories()).unwrap();

        prop_assert_eq!(&listed, &names);
        prop_assert_eq!(mock.calls().len(), pages.len());
        prop_assert_eq!(cursors(&mock), expected_cursors(&pages));
    }

    /// Listing tags follows the same cursor chain under the repository's path.
    #[test]
    fn tag_listing_is_complete((tags, sizes) in listing_strategy()) {
        let pages = split(&tags, &sizes);
        let mock = serve("/v2/team/app/tags/list", "tags", &pages);

        let listed = runtime()
            .block_on(client(&mock).tags("team%2Fapp"))
            .unwrap();

        prop_assert_eq!(&listed, &tags);
        prop_assert_eq!(mock.calls().len(), pages.len());
        prop_assert_eq!(cursors(&mock), expected_cursors(&pages));
    }
}
