//! Cursor based pagination.
//!
//! APIs in the docker registry family paginate with two query parameters: `n`, the
//! number of items requested, and `last`, the final item of the previous page. A page
//! which has more data after it carries a `Link: <...>; rel="next"` header.

use std::collections::VecDeque;
use std::fmt;
use std::task::{ready, Poll};

use futures::{future::BoxFuture, FutureExt};
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::uri::UriExtension as _;
use crate::{ApiClient, Authentication};

/// Upper bound on the number of pages a [`Paginated`] stream will request.
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// A response body which holds one page of items.
pub trait Paginator: DeserializeOwned {
    /// The type of item that the paginator will return
    type Item;

    /// Take all items from this page.
    fn items(self) -> Vec<Self::Item>;

    /// The cursor to resume listing after `item`.
    fn cursor(item: &Self::Item) -> &str;
}

/// Whether a listing continues after a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    /// More items follow; pass this cursor as `last` to fetch them.
    HasMore(String),

    /// This was the final page.
    Done,
}

impl PageState {
    /// Decide how a listing continues after `items`.
    ///
    /// `requested` is the page size sent to the server, `has_next` whether the server
    /// signalled a following page, and `previous` the cursor used to fetch this page.
    pub fn after<T, F>(
        items: &[T],
        requested: Option<usize>,
        has_next: bool,
        previous: Option<&str>,
        cursor: F,
    ) -> Self
    where
        F: Fn(&T) -> &str,
    {
        let Some(last) = items.last() else {
            return PageState::Done;
        };

        if requested.is_some_and(|n| items.len() < n) || !has_next {
            return PageState::Done;
        }

        let last = cursor(last);
        if previous.is_some_and(|previous| last <= previous) {
            tracing::warn!(
                cursor = last,
                previous,
                "server returned a page which does not advance the cursor"
            );
            return PageState::Done;
        }

        PageState::HasMore(last.to_owned())
    }

    /// The cursor for the following page, if there is one.
    pub fn cursor(&self) -> Option<&str> {
        match self {
            PageState::HasMore(cursor) => Some(cursor),
            PageState::Done => None,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items in the order the server returned them.
    pub items: Vec<T>,

    /// How the listing continues.
    pub state: PageState,
}

impl<T> Page<T> {
    /// Build a page from the items a server returned, fetched after `previous`.
    ///
    /// Items which do not sort after `previous` were already listed and are dropped, so
    /// a server which repeats a page ends the listing without yielding duplicates.
    pub fn from_items<F>(
        mut items: Vec<T>,
        requested: Option<usize>,
        has_next: bool,
        previous: Option<&str>,
        cursor: F,
    ) -> Self
    where
        F: Fn(&T) -> &str,
    {
        if let Some(previous) = previous {
            let returned = items.len();
            items.retain(|item| cursor(item) > previous);
            if items.len() < returned {
                tracing::warn!(
                    previous,
                    repeated = returned - items.len(),
                    "dropping items listed before the cursor"
                );
            }
        }

        let state = PageState::after(&items, requested, has_next, previous, &cursor);
        Page { items, state }
    }
}

impl<A> ApiClient<A>
where
    A: Authentication,
{
    /// Fetch a single page from `path`, relative to the base URL.
    ///
    /// `size` is sent as `n` when given; `last` is sent when it is non-empty.
    pub async fn page<P>(
        &self,
        path: &str,
        size: Option<usize>,
        last: Option<&str>,
    ) -> Result<Page<P::Item>, Error>
    where
        P: Paginator,
    {
        let last = last.filter(|last| !last.is_empty());

        let mut uri = self.endpoint(path)?;
        if let Some(n) = size {
            uri = uri.replace_query("n", &n.to_string())?;
        }
        if let Some(last) = last {
            uri = uri.replace_query("last", last)?;
        }

        tracing::debug!(%uri, "requesting page");

        let response = self
            .request(http::Method::GET, uri)
            .send()
            .await?
            .error_for_status()
            .await?;

        let has_next = response.next_link().is_some();
        let items = response.json::<P>().await?.items();
        Ok(Page::from_items(items, size, has_next, last, P::cursor))
    }

    /// Stream every item from `path`, following pages until the server is done.
    pub fn paginate<P>(&self, path: impl Into<String>, size: Option<usize>) -> Paginated<A, P>
    where
        P: Paginator,
    {
        Paginated::new(self.clone(), path, size)
    }
}

enum PaginatedStreamState<T> {
    Query,
    Requesting(BoxFuture<'static, Result<Page<T>, Error>>),
    Buffered(VecDeque<T>, PageState),
    Done,
}

/// A stream of items which can be collected from a paginated API response.
///
/// The type `A` should implement the `Authentication` trait, and the type `P` is the
/// response body of a single page.
#[pin_project::pin_project]
pub struct Paginated<A, P>
where
    P: Paginator,
{
    client: ApiClient<A>,
    path: String,
    size: Option<usize>,
    last: Option<String>,
    pages: usize,
    max_pages: usize,
    state: PaginatedStreamState<P::Item>,
}

impl<A: fmt::Debug, P: Paginator> fmt::Debug for Paginated<A, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paginated")
            .field("client", &self.client)
            .field("path", &self.path)
            .field("last", &self.last)
            .field("pages", &self.pages)
            .finish()
    }
}

impl<A, P: Paginator> Paginated<A, P> {
    /// Create a new paginated stream for `path`, relative to the client's base URL.
    pub fn new(client: ApiClient<A>, path: impl Into<String>, size: Option<usize>) -> Self {
        Self {
            client,
            path: path.into(),
            size,
            last: None,
            pages: 0,
            max_pages: DEFAULT_MAX_PAGES,
            state: PaginatedStreamState::Query,
        }
    }

    /// Stop after requesting this many pages.
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Number of pages requested so far.
    pub fn pages(&self) -> usize {
        self.pages
    }
}

impl<A, P> futures::Stream for Paginated<A, P>
where
    A: Authentication + Send + Sync + 'static,
    P: Paginator + Send + 'static,
    P::Item: Send + 'static,
{
    type Item = Result<P::Item, Error>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.project();
        loop {
            match this.state {
                PaginatedStreamState::Query => {
                    if *this.pages >= *this.max_pages {
                        tracing::warn!(
                            path = %this.path,
                            pages = *this.pages,
                            "giving up on pagination after too many pages"
                        );
                        *this.state = PaginatedStreamState::Done;
                        continue;
                    }

                    let client = this.client.clone();
                    let path = this.path.clone();
                    let size = *this.size;
                    let last = this.last.clone();

                    *this.pages += 1;
                    *this.state = PaginatedStreamState::Requesting(
                        async move { client.page::<P>(&path, size, last.as_deref()).await }
                            .boxed(),
                    );
                }
                PaginatedStreamState::Requesting(future) => {
                    match ready!(future.poll_unpin(cx)) {
                        Ok(page) => {
                            *this.state = PaginatedStreamState::Buffered(
                                VecDeque::from(page.items),
                                page.state,
                            );
                        }
                        Err(error) => {
                            *this.state = PaginatedStreamState::Done;
                            return Poll::Ready(Some(Err(error)));
                        }
                    }
                }
                PaginatedStreamState::Buffered(items, next) => {
                    if let Some(item) = items.pop_front() {
                        return Poll::Ready(Some(Ok(item)));
                    }

                    let following = match std::mem::replace(next, PageState::Done) {
                        PageState::HasMore(cursor) => {
                            tracing::trace!(cursor, "requesting next page");
                            *this.last = Some(cursor);
                            PaginatedStreamState::Query
                        }
                        PageState::Done => PaginatedStreamState::Done,
                    };
                    *this.state = following;
                }
                PaginatedStreamState::Done => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn state(
        items: &[&str],
        requested: Option<usize>,
        has_next: bool,
        previous: Option<&str>,
    ) -> PageState {
        PageState::after(&strings(items), requested, has_next, previous, String::as_str)
    }

    #[test]
    fn empty_page_is_done() {
        assert_eq!(state(&[], Some(2), true, Some("a")), PageState::Done);
        assert_eq!(state(&[], None, true, None), PageState::Done);
    }

    #[test]
    fn short_page_is_done() {
        assert_eq!(state(&["a"], Some(2), true, None), PageState::Done);
    }

    #[test]
    fn missing_link_is_done() {
        assert_eq!(state(&["a", "b"], Some(2), false, None), PageState::Done);
    }

    #[test]
    fn full_page_with_link_continues() {
        assert_eq!(
            state(&["a", "b"], Some(2), true, None),
            PageState::HasMore("b".into())
        );
        assert_eq!(
            state(&["c", "d"], None, true, Some("b")),
            PageState::HasMore("d".into())
        );
    }

    #[test]
    fn stalled_cursor_is_done() {
        assert_eq!(state(&["a", "b"], Some(2), true, Some("b")), PageState::Done);
        assert_eq!(state(&["a", "b"], Some(2), true, Some("c")), PageState::Done);
    }

    #[test]
    fn repeated_items_are_dropped() {
        let page = Page::from_items(strings(&["a", "b"]), None, true, Some("b"), String::as_str);
        assert!(page.items.is_empty());
        assert_eq!(page.state, PageState::Done);

        let page = Page::from_items(
            strings(&["b", "c", "d"]),
            None,
            true,
            Some("b"),
            String::as_str,
        );
        assert_eq!(page.items, strings(&["c", "d"]));
        assert_eq!(page.state, PageState::HasMore("d".into()));

        let page = Page::from_items(strings(&["a", "b"]), Some(2), true, None, String::as_str);
        assert_eq!(page.items, strings(&["a", "b"]));
        assert_eq!(page.state, PageState::HasMore("b".into()));
    }

    mod stream {
        use futures::TryStreamExt as _;
        use http::{HeaderMap, StatusCode};
        use serde::Deserialize;

        use super::*;
        use crate::mock::{next_link, MockService};

        #[derive(Debug, Deserialize)]
        struct Names {
            names: Vec<String>,
        }

        impl Paginator for Names {
            type Item = String;

            fn items(self) -> Vec<String> {
                self.names
            }

            fn cursor(item: &String) -> &str {
                item
            }
        }

        fn client(mock: &MockService) -> ApiClient<()> {
            ApiClient::new_with_inner_service(
                "http://registry.test/".parse().unwrap(),
                (),
                mock.clone(),
            )
        }

        #[tokio::test]
        async fn repeated_page_yields_no_duplicates() {
            let mut mock = MockService::new();
            mock.add_json_with_headers(
                "/names",
                &serde_json::json!({"names": ["a", "b"]}),
                next_link("/names?last=b"),
            );

            let names: Vec<String> = client(&mock)
                .paginate::<Names>("names", None)
                .try_collect()
                .await
                .unwrap();
            assert_eq!(names, vec!["a", "b"]);
            assert_eq!(mock.calls().len(), 2);
        }

        #[tokio::test]
        async fn page_count_is_tracked() {
            let mut mock = MockService::new();
            mock.add_json_with_headers(
                "/names",
                &serde_json::json!({"names": ["a"]}),
                next_link("/names?last=a"),
            );
            mock.add_json("/names?last=a", &serde_json::json!({"names": ["b"]}));

            let mut stream = client(&mock).paginate::<Names>("names", None);
            assert_eq!(stream.pages(), 0);

            let mut names = Vec::new();
            while let Some(name) = stream.try_next().await.unwrap() {
                names.push(name);
            }
            assert_eq!(names, vec!["a", "b"]);
            assert_eq!(stream.pages(), 2);
        }

        #[tokio::test]
        async fn page_limit_is_enforced() {
            let mut mock = MockService::new();
            mock.add_json_with_headers(
                "/names",
                &serde_json::json!({"names": ["a"]}),
                next_link("/names?last=a"),
            );
            mock.add(
                "/names?last=a",
                StatusCode::INTERNAL_SERVER_ERROR,
                HeaderMap::new(),
                "never requested",
            );

            let mut stream = client(&mock).paginate::<Names>("names", None).max_pages(1);
            let mut names = Vec::new();
            while let Some(name) = stream.try_next().await.unwrap() {
                names.push(name);
            }
            assert_eq!(names, vec!["a"]);
            assert_eq!(stream.pages(), 1);
            assert_eq!(mock.calls().len(), 1);
        }
    }
}
