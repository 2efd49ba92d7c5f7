//! Paginated API client
//!
//! Provides the facade the rest of an application talks to:
//! - URI resolution against a configurable base URL
//! - `per_page` set to the API maximum to save round trips
//! - Credential and user agent headers
//! - Paginated GETs merged into a single collection
//! - Idle-guarded downloads and uploads

use super::rate_limit::RateLimiter;
use super::watchdog::{Watchdog, WatchdogStream};
use crate::config::{ClientConfig, Credential};
use crate::error::{Error, Result};
use crate::merge::{merge, merge_document, MergeTarget};
use crate::pagination::{BodyStream, Page, PageFetcher, PageSource, PageStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LINK};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, debug_span};
use url::Url;

/// Query parameter carrying the page size
pub const PAGE_SIZE_PARAM: &str = "per_page";

const ACCEPT_JSON: &str = "application/json";
const ACCEPT_BINARY: &str = "application/octet-stream";

/// Client for a paginated REST API
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    rate_limiter: Option<RateLimiter>,
}

impl Client {
    /// Create a client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()?;
        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            http,
            config: Arc::new(config),
            rate_limiter,
        })
    }

    /// The active configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resolve `uri` against the base URL; absolute URLs pass through
    pub fn resolve(&self, uri: &str) -> Result<Url> {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Ok(Url::parse(uri)?);
        }
        let base = self.config.base_url.trim_end_matches('/');
        let path = uri.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// Resolve `uri` and set the page size, keeping every other query parameter
    pub fn resolve_paginated(&self, uri: &str) -> Result<Url> {
        let mut url = self.resolve(uri)?;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != PAGE_SIZE_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(PAGE_SIZE_PARAM, &self.config.page_size.to_string());
        Ok(url)
    }

    /// Fetch every page of `uri` and append all elements to `target`, in order.
    ///
    /// On error `target` may hold a partial result; discard it.
    pub async fn get<C: MergeTarget>(&self, uri: &str, target: &mut C) -> Result<()> {
        self.get_as(uri, self.config.credential.as_ref(), target).await
    }

    /// [`Client::get`] with an explicit credential (`None` = unauthenticated)
    pub async fn get_as<C: MergeTarget>(
        &self,
        uri: &str,
        credential: Option<&Credential>,
        target: &mut C,
    ) -> Result<()> {
        let span = debug_span!("get", uri);
        let stream = self.paginate_as(uri, credential, span.clone())?;
        let count = merge(stream, target).await?;
        span.in_scope(|| debug!(elements = count, "merged paginated response"));
        Ok(())
    }

    /// Concatenated bodies of every page of `uri` as one byte stream
    pub fn paginate(&self, uri: &str) -> Result<PageStream> {
        self.paginate_as(uri, self.config.credential.as_ref(), tracing::Span::current())
    }

    fn paginate_as(
        &self,
        uri: &str,
        credential: Option<&Credential>,
        span: tracing::Span,
    ) -> Result<PageStream> {
        let url = self.resolve_paginated(uri)?;
        let fetcher = PageFetcher::new(Arc::new(self.page_source(credential, ACCEPT_JSON)))
            .with_capacity(self.config.queue_capacity)
            .with_max_pages(self.config.max_pages)
            .with_rate_limiter(self.rate_limiter.clone())
            .with_span(span);
        Ok(fetcher.start(url))
    }

    /// Fetch a single, unpaginated JSON document.
    ///
    /// Fails with a pagination error if the response advertises a next page,
    /// since only the first page could be decoded.
    pub async fn get_one<T: DeserializeOwned>(&self, uri: &str) -> Result<T> {
        let url = self.resolve(uri)?;
        let page = self.fetch_ok(&url, ACCEPT_JSON).await?;
        if let Some(next) = page.next_url()? {
            return Err(Error::pagination(format!(
                "{} is paginated (next: {}); decode it into a collection",
                redacted_url(&page.url),
                redacted_url(&next)
            )));
        }
        merge_document(page.body).await
    }

    /// Stream the raw body of `uri`; the stream fails if it stalls past the idle timeout
    pub async fn download(&self, uri: &str) -> Result<BodyStream> {
        let url = self.resolve(uri)?;
        let page = self.fetch_ok(&url, ACCEPT_BINARY).await?;
        Ok(page.body)
    }

    /// Send `body` with a fixed content length and decode the JSON response.
    ///
    /// The transfer is aborted if the transport stops pulling body chunks,
    /// or stops producing response bytes, for longer than the idle timeout.
    pub async fn upload<T, S>(
        &self,
        method: Method,
        uri: &str,
        content_type: &str,
        content_length: u64,
        body: S,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        S: Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static,
    {
        let url = self.resolve(uri)?;
        let idle = self.config.idle_timeout;
        let watchdog = Watchdog::new(idle);

        let request = self
            .request(method.clone(), &url, self.config.credential.as_ref(), ACCEPT_JSON)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, content_length)
            .body(reqwest::Body::wrap_stream(watchdog.watch(body)));

        debug!(%method, url = %redacted_url(&url), content_length, "uploading");
        let response = tokio::select! {
            response = request.send() => response?,
            () = watchdog.expired() => return Err(Error::idle_timeout(idle)),
        };

        let page = page_from_response(response, idle);
        if !page.status.is_success() {
            return Err(page.into_status_error(method).await);
        }
        merge_document(page.body).await
    }

    async fn fetch_ok(&self, url: &Url, accept: &'static str) -> Result<Page> {
        let page = self
            .page_source(self.config.credential.as_ref(), accept)
            .fetch(url)
            .await?;
        if !page.status.is_success() {
            return Err(page.into_status_error(Method::GET).await);
        }
        Ok(page)
    }

    fn page_source(&self, credential: Option<&Credential>, accept: &'static str) -> HttpPageSource {
        HttpPageSource {
            client: self.clone(),
            authorization: credential.map(Credential::header_value),
            accept,
        }
    }

    fn request(
        &self,
        method: Method,
        url: &Url,
        credential: Option<&Credential>,
        accept: &str,
    ) -> RequestBuilder {
        let mut req = self.http.request(method, url.clone()).header(ACCEPT, accept);
        if let Some(credential) = credential {
            req = req.header(AUTHORIZATION, credential.header_value());
        }
        req
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// GETs pages over HTTP with the client's headers
struct HttpPageSource {
    client: Client,
    authorization: Option<String>,
    accept: &'static str,
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, url: &Url) -> Result<Page> {
        let idle = self.client.config.idle_timeout;
        let mut req = self
            .client
            .http
            .get(url.clone())
            .header(ACCEPT, self.accept);
        if let Some(auth) = &self.authorization {
            req = req.header(AUTHORIZATION, auth);
        }

        let response = tokio::time::timeout(idle, req.send())
            .await
            .map_err(|_| Error::idle_timeout(idle))??;
        debug!(
            url = %redacted_url(url),
            status = response.status().as_u16(),
            "GET"
        );
        Ok(page_from_response(response, idle))
    }
}

fn page_from_response(response: reqwest::Response, idle: Duration) -> Page {
    let url = response.url().clone();
    let status = response.status();
    let link = response
        .headers()
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = Box::pin(WatchdogStream::new(response.bytes_stream(), idle));
    Page::new(url, status, link, body)
}

/// `url` with secret query values (`access_token`) replaced, for logs and errors
pub fn redacted_url(url: &Url) -> Url {
    if !url.query_pairs().any(|(k, _)| k == "access_token") {
        return url.clone();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "access_token" {
                "REDACTED".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted
}
