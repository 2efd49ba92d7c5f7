//! Page types and the page source seam
//!
//! A [`Page`] is one response of a paginated sequence. Its body is a
//! stream so that a page is never buffered whole on the way to the merger.

use super::link::PaginationLinks;
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Method, StatusCode};
use std::pin::Pin;
use url::Url;

/// Streaming response body
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Upper bound on bytes read from an error response
const ERROR_BODY_LIMIT: usize = 64 * 1024;

/// One response of a paginated sequence
pub struct Page {
    /// URL the page was fetched from (after redirects)
    pub url: Url,
    /// Response status
    pub status: StatusCode,
    /// Raw `Link` header value
    pub link: Option<String>,
    /// Response body; dropping it releases the connection
    pub body: BodyStream,
}

impl Page {
    /// Create a page with a streaming body
    pub fn new(url: Url, status: StatusCode, link: Option<String>, body: BodyStream) -> Self {
        Self {
            url,
            status,
            link,
            body,
        }
    }

    /// Create a page whose body is already in memory
    pub fn from_bytes(
        url: Url,
        status: StatusCode,
        link: Option<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        let body = body.into();
        Self::new(
            url,
            status,
            link,
            Box::pin(futures::stream::once(async move { Ok(body) })),
        )
    }

    /// Relations advertised by this page
    pub fn links(&self) -> PaginationLinks {
        self.link
            .as_deref()
            .map(PaginationLinks::parse)
            .unwrap_or_default()
    }

    /// Absolute URL of the following page, if any
    pub fn next_url(&self) -> Result<Option<Url>> {
        self.links().next_url(&self.url)
    }

    /// Consume a non-success page into an HTTP status error, picking up the
    /// API's `message` field when the body carries one.
    pub async fn into_status_error(mut self, method: Method) -> Error {
        let mut buf = Vec::new();
        while buf.len() < ERROR_BODY_LIMIT {
            match self.body.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                Some(Err(_)) | None => break,
            }
        }
        buf.truncate(ERROR_BODY_LIMIT);

        Error::http_status(
            method,
            crate::http::redacted_url(&self.url).as_str(),
            self.status,
            api_error_message(&buf),
        )
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("url", &self.url.as_str())
            .field("status", &self.status)
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}

/// `{"message": "..."}` from an API error body
fn api_error_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

/// Anything that can fetch one page by absolute URL
///
/// The HTTP client is the production source; tests plug in in-memory ones.
/// A source reports transport failures as errors and hands back pages of
/// any status; the fetcher decides what a non-success status means.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the page at `url`
    async fn fetch(&self, url: &Url) -> Result<Page>;
}
