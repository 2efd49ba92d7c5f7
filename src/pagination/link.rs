//! Link header parsing (RFC 5988)
//!
//! Format: `Link: <https://api.github.com/...?page=2>; rel="next", <...>; rel="last"`

use crate::error::{Error, Result};
use std::collections::HashMap;
use url::Url;

/// Relation name that drives page chaining
pub const REL_NEXT: &str = "next";

/// Relations advertised by one response's `Link` header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationLinks {
    links: HashMap<String, String>,
}

impl PaginationLinks {
    /// Parse a `Link` header value. Malformed entries are skipped; when a
    /// relation appears more than once the first entry wins.
    pub fn parse(header: &str) -> Self {
        let mut links = HashMap::new();
        let mut rest = header;

        while let Some(open) = rest.find('<') {
            let Some(close) = rest[open..].find('>') else {
                break;
            };
            let url = rest[open + 1..open + close].trim();
            rest = &rest[open + close + 1..];

            // Parameters run until the next entry's comma, ignoring commas in quotes.
            let mut in_quotes = false;
            let end = rest
                .char_indices()
                .find(|&(_, c)| {
                    if c == '"' {
                        in_quotes = !in_quotes;
                    }
                    c == ',' && !in_quotes
                })
                .map_or(rest.len(), |(i, _)| i);
            let params = &rest[..end];
            rest = &rest[end..];

            for rel in relations(params) {
                links
                    .entry(rel.to_ascii_lowercase())
                    .or_insert_with(|| url.to_string());
            }
        }

        Self { links }
    }

    /// URL for a relation
    pub fn get(&self, rel: &str) -> Option<&str> {
        self.links.get(rel).map(String::as_str)
    }

    /// URL of the next page, if any
    pub fn next(&self) -> Option<&str> {
        self.get(REL_NEXT).filter(|u| !u.is_empty())
    }

    /// Resolve the next page against the URL of the page that advertised it
    pub fn next_url(&self, base: &Url) -> Result<Option<Url>> {
        let Some(next) = self.next() else {
            return Ok(None);
        };
        base.join(next)
            .map(Some)
            .map_err(|e| Error::pagination(format!("invalid next link '{next}': {e}")))
    }

    /// Whether the header advertised nothing
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Number of relations
    pub fn len(&self) -> usize {
        self.links.len()
    }
}

/// Relation names in a `; rel="a b"; title="x"` parameter list
fn relations(params: &str) -> Vec<&str> {
    params
        .split(';')
        .filter_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("rel")
                .then(|| value.trim().trim_matches('"').trim_matches('\''))
        })
        .flat_map(str::split_whitespace)
        .collect()
}
