//! Tests for pagination module

use super::*;
use crate::error::{Error, Result};
use crate::merge::merge;
use async_trait::async_trait;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use test_case::test_case;
use url::Url;

// ============================================================================
// In-memory page source
// ============================================================================

struct MockPage {
    status: StatusCode,
    body: String,
    link: Option<String>,
}

#[derive(Default)]
struct MockSource {
    pages: Vec<MockPage>,
    delay: Duration,
    started: AtomicUsize,
    completed: AtomicUsize,
    received: AtomicUsize,
    max_outstanding: AtomicUsize,
}

fn page_url(n: usize) -> Url {
    Url::parse(&format!("https://api.example.com/items?per_page=100&page={n}")).unwrap()
}

impl MockSource {
    /// Pages holding consecutive integers, `sizes[i]` elements on page i+1
    fn chain(sizes: &[usize]) -> Self {
        let mut next_value = 0;
        let pages = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let values: Vec<String> = (next_value..next_value + size)
                    .map(|v| v.to_string())
                    .collect();
                next_value += size;
                let number = i + 1;
                let link = if number < sizes.len() {
                    Some(format!(
                        r#"<{}>; rel="next", <{}>; rel="last""#,
                        page_url(number + 1),
                        page_url(sizes.len())
                    ))
                } else {
                    Some(format!(r#"<{}>; rel="first""#, page_url(1)))
                };
                MockPage {
                    status: StatusCode::OK,
                    body: format!("[{}]", values.join(",")),
                    link,
                }
            })
            .collect();
        Self {
            pages,
            ..Default::default()
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource for MockSource {
    async fn fetch(&self, url: &Url) -> Result<Page> {
        let started = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let outstanding = started - self.received.load(Ordering::SeqCst);
        self.max_outstanding.fetch_max(outstanding, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        let number: usize = url
            .query_pairs()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse().ok())
            .ok_or_else(|| Error::Other(format!("no page number in {url}")))?;
        let page = self
            .pages
            .get(number - 1)
            .ok_or_else(|| Error::Other(format!("connection refused: {url}")))?;
        Ok(Page::from_bytes(
            url.clone(),
            page.status,
            page.link.clone(),
            page.body.clone(),
        ))
    }
}

fn start(source: &Arc<MockSource>) -> PageStream {
    PageFetcher::new(Arc::clone(source) as Arc<dyn PageSource>).start(page_url(1))
}

// ============================================================================
// Link header parsing
// ============================================================================

#[test]
fn test_parse_next_and_last() {
    let links = PaginationLinks::parse(
        r#"<https://api.example.com/x?page=2>; rel="next", <https://api.example.com/x?page=9>; rel="last""#,
    );
    assert_eq!(links.len(), 2);
    assert_eq!(links.next(), Some("https://api.example.com/x?page=2"));
    assert_eq!(links.get("last"), Some("https://api.example.com/x?page=9"));
}

#[test_case(r#"<https://a.test/2>; rel=next"# ; "unquoted rel")]
#[test_case(r#"<https://a.test/2>; rel="next last""# ; "space separated rels")]
#[test_case(r#"<https://a.test/2>;rel="NEXT""# ; "uppercase rel no space")]
#[test_case(r#"<https://a.test/1>; rel="prev", <https://a.test/2>; title="a, b"; rel="next""# ; "comma in quoted param")]
#[test_case(r#"<https://a.test/2?a=1,2>; rel="next""# ; "comma in url")]
fn test_parse_next_variants(header: &str) {
    let links = PaginationLinks::parse(header);
    let next = links.next().unwrap();
    assert!(next.starts_with("https://a.test/2"), "{next}");
}

#[test_case("" ; "empty")]
#[test_case("garbage" ; "no brackets")]
#[test_case(r#"<https://a.test/9>; rel="last""# ; "last only")]
#[test_case(r#"<https://a.test/2"# ; "unterminated url")]
fn test_parse_without_next(header: &str) {
    assert!(PaginationLinks::parse(header).next().is_none());
}

#[test]
fn test_next_url_resolves_relative_links() {
    let base = Url::parse("https://api.example.com/repos/o/r/releases?page=1").unwrap();
    let links = PaginationLinks::parse(r#"</repos/o/r/releases?page=2>; rel="next""#);
    let next = links.next_url(&base).unwrap().unwrap();
    assert_eq!(
        next.as_str(),
        "https://api.example.com/repos/o/r/releases?page=2"
    );
}

#[test]
fn test_next_url_invalid_is_pagination_error() {
    let base = Url::parse("https://api.example.com/").unwrap();
    let links = PaginationLinks::parse(r#"<http://[::1>; rel="next""#);
    let err = links.next_url(&base).unwrap_err();
    assert!(matches!(err, Error::Pagination { .. }), "{err}");
}

#[test]
fn test_page_without_link_has_no_next() {
    let page = Page::from_bytes(page_url(1), StatusCode::OK, None, "[]");
    assert!(page.links().is_empty());
    assert!(page.next_url().unwrap().is_none());
}

// ============================================================================
// Response queue
// ============================================================================

#[tokio::test]
async fn test_queue_is_fifo_and_counts_slots() {
    let (tx, mut queue) = response_queue(3);
    assert_eq!(queue.capacity(), 3);

    for n in 1..=3 {
        let slot = tx.reserve().await.unwrap();
        assert!(
            tx.push(
                Page::from_bytes(page_url(n), StatusCode::OK, None, "[]"),
                slot
            )
            .await
        );
    }
    assert_eq!(queue.in_use(), 3);

    for n in 1..=3 {
        let (page, slot) = queue.next_page().await.unwrap().unwrap().into_parts();
        assert_eq!(page.url, page_url(n));
        drop(slot);
    }
    assert_eq!(queue.in_use(), 0);
}

#[tokio::test]
async fn test_queue_close_discards_pages_and_refuses_slots() {
    let (tx, mut queue) = response_queue(2);
    let slot = tx.reserve().await.unwrap();
    tx.push(Page::from_bytes(page_url(1), StatusCode::OK, None, "[]"), slot)
        .await;
    tx.fail(Error::Other("late".into())).await;

    assert_eq!(queue.close(), 1);
    assert!(tx.reserve().await.is_none());
    assert_eq!(queue.in_use(), 0);
}

// ============================================================================
// Fetcher pipeline
// ============================================================================

#[tokio::test]
async fn test_three_page_chain_merges_in_order() {
    let source = Arc::new(MockSource::chain(&[2, 2, 1]));
    let mut out: Vec<u32> = Vec::new();

    let count = merge(start(&source), &mut out).await.unwrap();

    assert_eq!(count, 5);
    assert_eq!(out, vec![0, 1, 2, 3, 4]);
    assert_eq!(source.started(), 3);
}

#[test_case(&[1] ; "single page")]
#[test_case(&[0, 3, 0] ; "empty pages")]
#[test_case(&[3, 1, 4, 1, 5, 9, 2, 6] ; "longer than capacity")]
#[tokio::test]
async fn test_merged_length_is_sum_of_pages(sizes: &[usize]) {
    let source = Arc::new(MockSource::chain(sizes));
    let mut out: Vec<usize> = Vec::new();

    merge(start(&source), &mut out).await.unwrap();

    let total: usize = sizes.iter().sum();
    assert_eq!(out, (0..total).collect::<Vec<_>>());
    assert_eq!(source.started(), sizes.len());
}

#[tokio::test]
async fn test_error_status_on_second_page() {
    let mut source = MockSource::chain(&[2, 2, 1]);
    source.pages[1].status = StatusCode::BAD_GATEWAY;
    source.pages[1].body = r#"{"message":"upstream unavailable"}"#.to_string();
    let source = Arc::new(source);

    let mut out: Vec<u32> = Vec::new();
    let err = merge(start(&source), &mut out).await.unwrap_err();

    match err {
        Error::HttpStatus {
            status,
            ref url,
            ref message,
            ..
        } => {
            assert_eq!(status, StatusCode::BAD_GATEWAY);
            assert!(url.contains("page=2"));
            assert_eq!(message.as_deref(), Some("upstream unavailable"));
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(source.started(), 2);
}

#[tokio::test]
async fn test_fetch_error_propagates() {
    let mut source = MockSource::chain(&[1, 1]);
    source.pages[0].link = Some(r#"<https://api.example.com/items?page=7>; rel="next""#.into());
    let source = Arc::new(source);

    let mut out: Vec<u32> = Vec::new();
    let err = merge(start(&source), &mut out).await.unwrap_err();
    assert!(err.to_string().contains("connection refused"));
}

#[tokio::test]
async fn test_invalid_next_link_after_page_is_delivered() {
    let mut source = MockSource::chain(&[2, 1]);
    source.pages[0].link = Some(r#"<http://[::1>; rel="next""#.into());
    let source = Arc::new(source);

    let mut stream = start(&source);
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(&first[..], b"[0,1]");
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Pagination { .. }));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_max_pages_stops_link_loops() {
    let mut source = MockSource::chain(&[1]);
    source.pages[0].link = Some(format!(r#"<{}>; rel="next""#, page_url(1)));
    let source = Arc::new(source);

    let stream = PageFetcher::new(Arc::clone(&source) as Arc<dyn PageSource>)
        .with_max_pages(Some(3))
        .start(page_url(1));
    let mut out: Vec<u32> = Vec::new();
    let err = merge(stream, &mut out).await.unwrap_err();

    assert!(matches!(err, Error::Pagination { .. }));
    assert_eq!(out, vec![0, 0, 0]);
    assert_eq!(source.started(), 3);
}

#[tokio::test]
async fn test_backpressure_caps_outstanding_pages() {
    let source = Arc::new(MockSource::chain(&[1; 12]));
    let mut stream = start(&source);

    // Nothing consumed yet: the producer must stall after filling the queue.
    for _ in 0..100 {
        if source.started() >= 5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.started(), 5);
    assert_eq!(stream.in_flight(), 5);

    let mut values = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        source.received.fetch_add(1, Ordering::SeqCst);
        values.push(String::from_utf8(chunk.to_vec()).unwrap());
    }

    assert_eq!(values.len(), 12);
    assert_eq!(values[11], "[11]");
    assert_eq!(stream.pages(), 12);
    assert!(source.max_outstanding.load(Ordering::SeqCst) <= 5);
}

#[tokio::test]
async fn test_custom_capacity() {
    let source = Arc::new(MockSource::chain(&[1; 6]));
    let stream = PageFetcher::new(Arc::clone(&source) as Arc<dyn PageSource>)
        .with_capacity(2)
        .start(page_url(1));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.started(), 2);
    assert_eq!(stream.in_flight(), 2);
    drop(stream);
}

#[tokio::test]
async fn test_drop_lets_in_flight_fetch_finish_then_stops() {
    let source = Arc::new(MockSource::chain(&[1; 10]).with_delay(Duration::from_millis(40)));
    let mut stream = start(&source);

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(&first[..], b"[0]");
    drop(stream);
    let started_at_drop = source.started();

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(source.started(), started_at_drop);
    assert_eq!(source.completed(), source.started());
    assert!(source.started() < 10);
}

#[tokio::test]
async fn test_explicit_cancel_ends_stream() {
    let source = Arc::new(MockSource::chain(&[1; 8]));
    let mut stream = start(&source);

    stream.next().await.unwrap().unwrap();
    stream.cancel();

    assert!(stream.next().await.is_none());
    assert_eq!(stream.in_flight(), 0);
}
