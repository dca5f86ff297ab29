//! Cursor-following pagination over list endpoints
//!
//! [`paginate`] turns a list endpoint into a stream of items. Pages are fetched one at
//! a time as the consumer pulls: the first item is available as soon as the first page
//! arrives, and the next page is requested only after the current one is drained. A
//! page whose response has no `rel="next"` link ends the stream.

use crate::client::{Accept, ApiClient};
use crate::error::Result;
use crate::types::{Release, RepositoryId};
use futures::{Stream, StreamExt, stream};
use reqwest::header::{HeaderMap, LINK};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;

enum Cursor<T> {
    /// Next page to request; the query is only sent with the first one
    Fetch {
        url: String,
        query: Vec<(String, String)>,
    },
    /// Items left on the current page, then the following page if any
    Page {
        items: VecDeque<T>,
        next: Option<String>,
    },
}

/// Stream every item of a paginated list endpoint, in page order then in-page order
///
/// Any page failure (after the retrier gave up on it) is yielded as an error and ends
/// the stream.
pub fn paginate<T>(
    client: &ApiClient,
    url: String,
    query: Vec<(String, String)>,
) -> impl Stream<Item = Result<T>> + '_
where
    T: DeserializeOwned + 'static,
{
    stream::try_unfold(Cursor::Fetch { url, query }, move |cursor| {
        advance(client, cursor)
    })
}

async fn advance<T>(client: &ApiClient, mut cursor: Cursor<T>) -> Result<Option<(T, Cursor<T>)>>
where
    T: DeserializeOwned,
{
    loop {
        cursor = match cursor {
            Cursor::Page { mut items, next } => match items.pop_front() {
                Some(item) => return Ok(Some((item, Cursor::Page { items, next }))),
                None => match next {
                    Some(url) => Cursor::Fetch {
                        url,
                        query: Vec::new(),
                    },
                    None => return Ok(None),
                },
            },
            Cursor::Fetch { url, query } => {
                let response = client.get(&url, Accept::Json, &query).await?;
                let next = next_link(response.headers());
                let items: VecDeque<T> = response.json().await?;
                tracing::debug!(
                    url = %url,
                    items = items.len(),
                    has_next = next.is_some(),
                    "Fetched page"
                );
                Cursor::Page { items, next }
            }
        };
    }
}

/// Stream the releases of a repository, newest first as the remote lists them
pub fn releases<'a>(
    client: &'a ApiClient,
    repository: &RepositoryId,
) -> impl Stream<Item = Result<Release>> + 'a {
    let query = vec![("per_page".to_string(), client.api().page_size.to_string())];
    paginate::<serde_json::Value>(client, client.releases_url(repository), query)
        .map(|item| item.and_then(Release::from_value))
}

/// Find the `rel="next"` target in a `Link` header
///
/// # Examples
///
/// ```
/// use reqwest::header::{HeaderMap, HeaderValue, LINK};
/// use release_mirror::pagination::next_link;
///
/// let mut headers = HeaderMap::new();
/// headers.insert(
///     LINK,
///     HeaderValue::from_static(
///         r#"<https://api.example.com/r?page=2>; rel="next", <https://api.example.com/r?page=5>; rel="last""#,
///     ),
/// );
/// assert_eq!(next_link(&headers).as_deref(), Some("https://api.example.com/r?page=2"));
/// ```
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(parse_next)
}

fn parse_next(link: &str) -> Option<String> {
    let mut parts = link.split(';');
    let target = parts.next()?.trim();
    let target = target.strip_prefix('<')?.strip_suffix('>')?;

    let is_next = parts.any(|param| {
        let Some((key, value)) = param.split_once('=') else {
            return false;
        };
        key.trim().eq_ignore_ascii_case("rel")
            && value
                .trim()
                .trim_matches('"')
                .split_ascii_whitespace()
                .any(|rel| rel.eq_ignore_ascii_case("next"))
    });

    is_next.then(|| target.to_string())
}
