//! Background page fetcher
//!
//! [`PageFetcher::start`] spawns a producer task that walks the `next`
//! links of a paginated response and feeds the pages, in order, into a
//! [`ResponseQueue`]. The returned [`PageStream`] is the consumer side:
//! the concatenated bodies of every page as one byte stream, with errors
//! from either side delivered in-band.

use super::queue::{response_queue, QueueSender, QueueSlot, ResponseQueue};
use super::types::{BodyStream, PageSource};
use crate::config::DEFAULT_QUEUE_CAPACITY;
use crate::error::{Error, Result};
use crate::http::{redacted_url, RateLimiter};
use bytes::Bytes;
use futures::Stream;
use reqwest::Method;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument, Span};
use url::Url;

/// Walks a chain of `next` links on a background task
#[derive(Clone)]
pub struct PageFetcher {
    source: Arc<dyn PageSource>,
    capacity: usize,
    max_pages: Option<usize>,
    rate_limiter: Option<RateLimiter>,
    span: Option<Span>,
}

impl PageFetcher {
    /// Create a fetcher over `source` with the default queue capacity
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self {
            source,
            capacity: DEFAULT_QUEUE_CAPACITY,
            max_pages: None,
            rate_limiter: None,
            span: None,
        }
    }

    /// Bound on pages in flight or unconsumed
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Fail instead of following more than `max_pages` pages
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Pace page requests
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Option<RateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    /// Span the producer task logs under (defaults to the caller's current span)
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Start fetching at `initial` and return the consumer stream.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&self, initial: Url) -> PageStream {
        let (tx, queue) = response_queue(self.capacity);
        let cancel = CancellationToken::new();
        let span = self.span.clone().unwrap_or_else(Span::current);

        let producer = Producer {
            source: Arc::clone(&self.source),
            tx,
            cancel: cancel.clone(),
            max_pages: self.max_pages,
            rate_limiter: self.rate_limiter.clone(),
        };
        tokio::spawn(producer.run(initial).instrument(span));

        PageStream {
            queue,
            cancel,
            current: None,
            pages: 0,
            finished: false,
        }
    }
}

impl std::fmt::Debug for PageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFetcher")
            .field("capacity", &self.capacity)
            .field("max_pages", &self.max_pages)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

struct Producer {
    source: Arc<dyn PageSource>,
    tx: QueueSender,
    cancel: CancellationToken,
    max_pages: Option<usize>,
    rate_limiter: Option<RateLimiter>,
}

impl Producer {
    async fn run(self, initial: Url) {
        let mut next = Some(initial);
        let mut fetched = 0usize;

        while let Some(url) = next.take() {
            if let Some(max) = self.max_pages {
                if fetched >= max {
                    self.tx
                        .fail(Error::pagination(format!(
                            "more than {max} pages, stopping at {}",
                            redacted_url(&url)
                        )))
                        .await;
                    return;
                }
            }

            // Backpressure: wait until fewer than `capacity` pages are outstanding.
            let slot = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                slot = self.tx.reserve() => match slot {
                    Some(slot) => slot,
                    None => return,
                },
            };

            if let Some(limiter) = &self.rate_limiter {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return,
                    () = limiter.wait() => {}
                }
            }

            match self.fetch(&url, slot).await {
                Step::Continue(following) => {
                    fetched += 1;
                    next = following;
                }
                Step::Stop => return,
            }
        }

        debug!(pages = fetched, "pagination complete");
    }

    async fn fetch(&self, url: &Url, slot: QueueSlot) -> Step {
        debug!(url = %redacted_url(url), "fetching page");

        // An in-flight request is never aborted; its result is discarded instead.
        let result = self.source.fetch(url).await;
        if self.cancel.is_cancelled() {
            debug!(url = %redacted_url(url), "consumer stopped, discarding page");
            return Step::Stop;
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(url = %redacted_url(url), error = %e, "page fetch failed");
                self.tx.fail(e).await;
                return Step::Stop;
            }
        };

        if !page.status.is_success() {
            let error = page.into_status_error(Method::GET).await;
            warn!(error = %error, "page returned error status");
            self.tx.fail(error).await;
            return Step::Stop;
        }

        let following = page.next_url();
        if !self.tx.push(page, slot).await {
            return Step::Stop;
        }

        match following {
            Ok(following) => Step::Continue(following),
            Err(e) => {
                self.tx.fail(e).await;
                Step::Stop
            }
        }
    }
}

enum Step {
    Continue(Option<Url>),
    Stop,
}

/// Byte stream over the concatenated bodies of every page, in fetch order
///
/// The stream ends after the last page or after the first error. Dropping
/// it (or calling [`PageStream::cancel`]) stops the producer and closes
/// every page that was fetched but not consumed.
pub struct PageStream {
    queue: ResponseQueue,
    cancel: CancellationToken,
    current: Option<(BodyStream, QueueSlot)>,
    pages: usize,
    finished: bool,
}

impl PageStream {
    /// Pages received from the queue so far
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Pages currently in flight, queued, or being drained
    pub fn in_flight(&self) -> usize {
        self.queue.in_use()
    }

    /// Stop the pipeline and release every undrained page
    pub fn cancel(&mut self) {
        self.finished = true;
        self.cancel.cancel();
        // Close before releasing the current slot so a waiting producer cannot claim it.
        let discarded = self.queue.close();
        self.current = None;
        if discarded > 0 {
            debug!(discarded, "closed undrained pages");
        }
    }
}

impl Stream for PageStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            if let Some((body, _slot)) = this.current.as_mut() {
                match ready!(body.as_mut().poll_next(cx)) {
                    Some(Ok(chunk)) => return Poll::Ready(Some(Ok(chunk))),
                    Some(Err(e)) => {
                        this.cancel();
                        return Poll::Ready(Some(Err(e)));
                    }
                    None => {
                        // Page drained; dropping its slot lets the producer fetch another.
                        this.current = None;
                        continue;
                    }
                }
            }

            match ready!(this.queue.poll_next_page(cx)) {
                Some(Ok(queued)) => {
                    let (page, slot) = queued.into_parts();
                    this.pages += 1;
                    debug!(page = this.pages, url = %redacted_url(&page.url), "draining page");
                    this.current = Some((page.body, slot));
                }
                Some(Err(e)) => {
                    this.cancel();
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.finished = true;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl Drop for PageStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for PageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageStream")
            .field("pages", &self.pages)
            .field("in_flight", &self.queue.in_use())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
