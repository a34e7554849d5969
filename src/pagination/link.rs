//! pagination::link
//!
//! Parser for relation-annotated link lists (`<url>; rel="next", ...`).
//!
//! # Tolerance
//!
//! The parser never fails. A segment that is malformed (no `<...>` target,
//! an unparseable URL, or no `rel`) is skipped on its own and the remaining
//! segments are still used. Callers treat a missing relation as "no such
//! page", so a bad header degrades to "no further pages" instead of failing
//! a listing that already returned valid data.
//!
//! # Example
//!
//! ```
//! use hookwise::pagination::link::parse_link_header;
//!
//! let links = parse_link_header(
//!     r#"<https://api.github.com/repositories/1/issues?page=2>; rel="next", <https://api.github.com/repositories/1/issues?page=5>; rel="last""#,
//! );
//! assert_eq!(links.next().unwrap().param("page"), Some("2"));
//! assert_eq!(links.get("last").unwrap().param("page"), Some("5"));
//! assert!(links.get("prev").is_none());
//! ```

use std::collections::BTreeMap;

use reqwest::Url;

/// One link target together with its extracted parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// The raw target URL.
    pub url: String,
    /// Query parameters of the URL, overlaid by any extra `key="value"`
    /// attributes that followed the target (attributes win).
    pub params: BTreeMap<String, String>,
}

impl Link {
    /// Look up an extracted parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Relation name → link table.
///
/// For a relation that appears more than once the later segment wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    links: BTreeMap<String, Link>,
}

impl LinkSet {
    /// Look up a relation by name.
    pub fn get(&self, rel: &str) -> Option<&Link> {
        self.links.get(rel)
    }

    /// The `next` relation, if present.
    pub fn next(&self) -> Option<&Link> {
        self.get("next")
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Relation names in sorted order.
    pub fn rels(&self) -> impl Iterator<Item = &str> {
        self.links.keys().map(String::as_str)
    }

    fn insert(&mut self, rel: String, link: Link) {
        self.links.insert(rel, link);
    }
}

/// Parse a link header value into a [`LinkSet`].
///
/// A relation attribute may name several relations separated by whitespace
/// (`rel="next last"`); the link is registered under each of them.
pub fn parse_link_header(value: &str) -> LinkSet {
    let mut set = LinkSet::default();

    for segment in split_top_level(value, ',') {
        if let Some((rels, link)) = parse_segment(segment) {
            for rel in rels {
                set.insert(rel, link.clone());
            }
        }
    }

    set
}

/// Parse one `<url>; key="value"; ...` segment.
///
/// Returns `None` when the segment should be skipped.
fn parse_segment(segment: &str) -> Option<(Vec<String>, Link)> {
    let segment = segment.trim();
    let rest = segment.strip_prefix('<')?;
    let end = rest.find('>')?;
    let target = rest[..end].trim();
    let attributes = &rest[end + 1..];
    if target.contains(|c: char| c.is_whitespace() || c == '<') {
        return None;
    }

    let url = Url::parse(target).ok()?;
    let mut params: BTreeMap<String, String> = url.query_pairs().into_owned().collect();

    let mut rels = Vec::new();
    for attribute in split_top_level(attributes, ';') {
        let Some((key, raw)) = attribute.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }
        let value = unquote(raw.trim());

        if key == "rel" {
            rels.extend(value.split_whitespace().map(str::to_string));
        } else {
            params.insert(key, value.to_string());
        }
    }

    if rels.is_empty() {
        return None;
    }

    Some((
        rels,
        Link {
            url: target.to_string(),
            params,
        },
    ))
}

/// Split on `separator` where it is not inside `<...>` or a quoted string.
fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_target = false;
    let mut in_quotes = false;
    let mut start = 0;

    for (idx, c) in input.char_indices() {
        match c {
            '<' if !in_quotes => in_target = true,
            '>' if !in_quotes => in_target = false,
            '"' if !in_target => in_quotes = !in_quotes,
            c if c == separator && !in_target && !in_quotes => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);

    parts
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
