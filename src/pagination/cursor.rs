//! pagination::cursor
//!
//! Derives the next request's arguments from a response's [`LinkSet`].
//!
//! # Idioms
//!
//! GitHub paginates different endpoints differently:
//!
//! - **Cursor style**: the `next` link carries `since=<token>` (users, some
//!   event feeds). The next request replaces `since` and drops `page`.
//! - **Page style**: the `next` link carries `page=<n>`. The next request
//!   replaces `page` only.
//! - **URL fallback**: neither value is among the link's extracted
//!   parameters; the `next` URL's own query string is read directly.
//! - **Search style**: search endpoints may rewrite `q` between pages, so
//!   both `q` and `page` are taken from the `next` URL.
//!
//! Every other argument in the current request (filters, sort order, page
//! size) is carried through untouched. The resolver never adds or drops
//! arguments that are unrelated to pagination.
//!
//! # Example
//!
//! ```
//! use hookwise::pagination::cursor::{next_page_args, PageArgs};
//! use hookwise::pagination::link::parse_link_header;
//!
//! let current = PageArgs::new().with("page", 1).with("sort", "created");
//! let links = parse_link_header(r#"<https://x.test/y?page=2>; rel="next""#);
//!
//! let next = next_page_args(&current, &links).unwrap();
//! assert_eq!(next, PageArgs::new().with("page", 2).with("sort", "created"));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::link::LinkSet;

/// Argument carrying the page number.
pub const PAGE: &str = "page";

/// Argument carrying the cursor token.
pub const SINCE: &str = "since";

/// Argument carrying a search query.
pub const QUERY: &str = "q";

/// A single request argument value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Int(i64),
    Text(String),
}

impl ArgValue {
    /// Interpret a raw query value: all-digit values become integers,
    /// anything else stays opaque text.
    pub fn parse(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse::<i64>() {
                return ArgValue::Int(n);
            }
        }
        ArgValue::Text(raw.to_string())
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Int(n) => write!(f, "{n}"),
            ArgValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ArgValue {
    fn from(n: i64) -> Self {
        ArgValue::Int(n)
    }
}

impl From<u64> for ArgValue {
    fn from(n: u64) -> Self {
        ArgValue::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<i32> for ArgValue {
    fn from(n: i32) -> Self {
        ArgValue::Int(n.into())
    }
}

impl From<u32> for ArgValue {
    fn from(n: u32) -> Self {
        ArgValue::Int(n.into())
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Text(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::Text(s)
    }
}

/// The argument set of one collection request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageArgs(BTreeMap<String, ArgValue>);

impl PageArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ArgValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ArgValue> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render as query string pairs.
    pub fn to_query(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<ArgValue>> FromIterator<(K, V)> for PageArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// The minimal argument delta that selects the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Page-numbered pagination.
    Page(u64),
    /// Cursor-token pagination.
    Since(ArgValue),
}

impl PageCursor {
    /// Apply this cursor to the arguments of the request that produced it.
    pub fn apply(&self, current: &PageArgs) -> PageArgs {
        let mut next = current.clone();
        match self {
            PageCursor::Page(page) => next.set(PAGE, *page),
            PageCursor::Since(token) => {
                next.remove(PAGE);
                next.set(SINCE, token.clone());
            }
        }
        next
    }
}

/// How an endpoint paginates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaginationStyle {
    /// `since` or `page`, chosen per response.
    #[default]
    Standard,
    /// Search endpoints: `q` and `page` from the next URL.
    Search,
}

impl PaginationStyle {
    /// Resolve the next request's arguments in this style.
    pub fn next_args(self, current: &PageArgs, links: &LinkSet) -> Option<PageArgs> {
        match self {
            PaginationStyle::Standard => next_page_args(current, links),
            PaginationStyle::Search => next_search_args(current, links),
        }
    }
}

/// Work out which cursor the `next` relation points at.
///
/// Returns `None` when there is no `next` relation or no usable pagination
/// value can be found in it (terminal page).
pub fn resolve_cursor(links: &LinkSet) -> Option<PageCursor> {
    let next = links.next()?;

    if let Some(since) = next.param(SINCE) {
        return Some(PageCursor::Since(ArgValue::parse(since)));
    }

    if let Some(page) = next.param(PAGE).and_then(|p| p.parse::<u64>().ok()) {
        return Some(PageCursor::Page(page));
    }

    cursor_from_url(&next.url)
}

/// Read `since` or `page` straight from a URL's query string.
fn cursor_from_url(url: &str) -> Option<PageCursor> {
    let url = Url::parse(url).ok()?;
    let mut page = None;
    let mut since = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            SINCE => since = Some(ArgValue::parse(&value)),
            PAGE => page = value.parse::<u64>().ok(),
            _ => {}
        }
    }

    since
        .map(PageCursor::Since)
        .or(page.map(PageCursor::Page))
}

/// Arguments for the next page, or `None` if this was the last page.
pub fn next_page_args(current: &PageArgs, links: &LinkSet) -> Option<PageArgs> {
    resolve_cursor(links).map(|cursor| cursor.apply(current))
}

/// Arguments for the next page of a search endpoint.
///
/// The server may normalise the query between pages, so `q` is taken from the
/// `next` URL when present. A `next` link without a numeric `page` is
/// treated as terminal rather than re-requesting the same page.
pub fn next_search_args(current: &PageArgs, links: &LinkSet) -> Option<PageArgs> {
    let next = links.next()?;
    let url = Url::parse(&next.url).ok()?;

    let mut page = None;
    let mut query = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            PAGE => page = value.parse::<u64>().ok(),
            QUERY => query = Some(value.into_owned()),
            _ => {}
        }
    }

    let mut args = current.clone();
    args.set(PAGE, page?);
    if let Some(q) = query {
        args.set(QUERY, q);
    }
    Some(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::link::parse_link_header;

    fn links(header: &str) -> LinkSet {
        parse_link_header(header)
    }

    #[test]
    fn page_style_replaces_only_page() {
        let current = PageArgs::new().with("page", 1).with("sort", "created");
        let next = next_page_args(&current, &links(r#"<https://x/y?page=2>; rel="next""#));
        assert_eq!(
            next,
            Some(PageArgs::new().with("page", 2).with("sort", "created"))
        );
    }

    #[test]
    fn cursor_style_drops_page() {
        let current = PageArgs::new().with("page", 3);
        let next = next_page_args(
            &current,
            &links(r#"<https://x/y?since=1700000000>; rel="next""#),
        );
        assert_eq!(next, Some(PageArgs::new().with("since", 1_700_000_000i64)));
    }

    #[test]
    fn since_wins_over_page_in_same_link() {
        let cursor = resolve_cursor(&links(r#"<https://x/y?page=4&since=99>; rel="next""#));
        assert_eq!(cursor, Some(PageCursor::Since(ArgValue::Int(99))));
    }

    #[test]
    fn opaque_since_token_is_kept_as_text() {
        let cursor = resolve_cursor(&links(r#"<https://x/y?since=Y3Vyc29yOjE%3D>; rel="next""#));
        assert_eq!(
            cursor,
            Some(PageCursor::Since(ArgValue::Text("Y3Vyc29yOjE=".into())))
        );
    }

    #[test]
    fn no_next_relation_is_terminal() {
        let current = PageArgs::new().with("page", 5);
        assert_eq!(
            next_page_args(
                &current,
                &links(r#"<https://x/y?page=4>; rel="prev", <https://x/y?page=1>; rel="first""#)
            ),
            None
        );
        assert_eq!(next_page_args(&current, &LinkSet::default()), None);
    }

    #[test]
    fn non_numeric_page_falls_back_to_url() {
        let set = links(r#"<https://x/y?page=6>; rel="next"; page="six""#);
        assert_eq!(resolve_cursor(&set), Some(PageCursor::Page(6)));
    }

    #[test]
    fn next_without_pagination_values_is_terminal() {
        assert_eq!(
            resolve_cursor(&links(r#"<https://x/y?sort=asc>; rel="next""#)),
            None
        );
    }

    #[test]
    fn unrelated_arguments_are_carried_through() {
        let current = PageArgs::new()
            .with("state", "open")
            .with("per_page", 50)
            .with("direction", "desc")
            .with("page", 1);
        let next = next_page_args(
            &current,
            &links(r#"<https://x/y?page=2&state=closed&extra=1>; rel="next""#),
        )
        .unwrap();

        assert_eq!(next.get("state"), Some(&ArgValue::from("open")));
        assert_eq!(next.get("per_page"), Some(&ArgValue::Int(50)));
        assert_eq!(next.get("direction"), Some(&ArgValue::from("desc")));
        assert!(!next.contains("extra"));
        assert_eq!(next.get("page"), Some(&ArgValue::Int(2)));
    }

    #[test]
    fn search_style_carries_query_from_url() {
        let current = PageArgs::new().with("q", "bug").with("sort", "updated");
        let next = next_search_args(
            &current,
            &links(r#"<https://x/search/issues?q=bug+repo%3Ao%2Fr&page=2>; rel="next""#),
        )
        .unwrap();
        assert_eq!(next.get("q"), Some(&ArgValue::from("bug repo:o/r")));
        assert_eq!(next.get("page"), Some(&ArgValue::Int(2)));
        assert_eq!(next.get("sort"), Some(&ArgValue::from("updated")));
    }

    #[test]
    fn search_style_without_page_is_terminal() {
        let current = PageArgs::new().with("q", "bug");
        assert_eq!(
            next_search_args(&current, &links(r#"<https://x/search?q=bug>; rel="next""#)),
            None
        );
    }

    #[test]
    fn arg_value_parsing() {
        assert_eq!(ArgValue::parse("42"), ArgValue::Int(42));
        assert_eq!(ArgValue::parse("-1"), ArgValue::Text("-1".into()));
        assert_eq!(ArgValue::parse(""), ArgValue::Text(String::new()));
        assert_eq!(ArgValue::parse("2024-01-01T00:00:00Z"), ArgValue::Text("2024-01-01T00:00:00Z".into()));
    }

    #[test]
    fn page_args_render_query_pairs() {
        let args = PageArgs::new().with("page", 2).with("q", "is:open");
        assert_eq!(
            args.to_query(),
            vec![
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "is:open".to_string())
            ]
        );
    }
}
