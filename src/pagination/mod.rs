//! pagination
//!
//! Link header parsing and next-page resolution.
//!
//! # Modules
//!
//! - [`link`]: Parses `<url>; rel="next", ...` values into a [`LinkSet`]
//! - [`cursor`]: Derives the next request's arguments from a [`LinkSet`]
//!
//! Both are pure transforms with no I/O. The HTTP side lives in
//! [`crate::forge::github`], which feeds response headers through here.

pub mod cursor;
pub mod link;

pub use cursor::{
    next_page_args, next_search_args, resolve_cursor, ArgValue, PageArgs, PageCursor,
    PaginationStyle,
};
pub use link::{parse_link_header, Link, LinkSet};

/// One page of a collection listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items returned by this request.
    pub items: Vec<T>,
    /// Arguments for the following request, `None` on the last page.
    pub next: Option<PageArgs>,
}

impl<T> Page<T> {
    /// Whether this is the final page.
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}
