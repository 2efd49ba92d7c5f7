//! Bounded, order-preserving hand-off between the page fetcher and the merger
//!
//! A page needs a slot before it is fetched and keeps it until the
//! consumer has drained its body, so the capacity bounds every page that
//! is in flight or waiting, not just the ones sitting in the channel.

use super::types::Page;
use crate::error::{Error, Result};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

/// A claim on one unit of queue capacity; released on drop
#[derive(Debug)]
pub struct QueueSlot {
    _permit: OwnedSemaphorePermit,
}

/// A page together with the slot it occupies
#[derive(Debug)]
pub struct QueuedPage {
    /// The page
    pub page: Page,
    slot: QueueSlot,
}

impl QueuedPage {
    /// Split into the page and the slot that must outlive its body
    pub fn into_parts(self) -> (Page, QueueSlot) {
        (self.page, self.slot)
    }
}

/// Create a queue holding at most `capacity` pages
pub fn response_queue(capacity: usize) -> (QueueSender, ResponseQueue) {
    let capacity = capacity.max(1);
    let slots = Arc::new(Semaphore::new(capacity));
    // One spare entry so the terminal error never waits behind a full queue.
    let (tx, rx) = mpsc::channel(capacity + 1);
    (
        QueueSender {
            tx,
            slots: Arc::clone(&slots),
        },
        ResponseQueue {
            rx,
            slots,
            capacity,
        },
    )
}

/// Producer half
#[derive(Debug)]
pub struct QueueSender {
    tx: mpsc::Sender<Result<QueuedPage>>,
    slots: Arc<Semaphore>,
}

impl QueueSender {
    /// Wait for free capacity. Returns `None` once the consumer has shut the queue.
    pub async fn reserve(&self) -> Option<QueueSlot> {
        Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .ok()
            .map(|permit| QueueSlot { _permit: permit })
    }

    /// Enqueue a page in its reserved slot. Returns false, dropping the
    /// page, if the consumer is gone.
    pub async fn push(&self, page: Page, slot: QueueSlot) -> bool {
        self.tx.send(Ok(QueuedPage { page, slot })).await.is_ok()
    }

    /// Report a terminal error after the pages already queued
    pub async fn fail(&self, error: Error) {
        if self.tx.send(Err(error)).await.is_err() {
            tracing::debug!("consumer gone before error could be delivered");
        }
    }
}

/// Consumer half
#[derive(Debug)]
pub struct ResponseQueue {
    rx: mpsc::Receiver<Result<QueuedPage>>,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl ResponseQueue {
    /// Next page in fetch order; `None` when the producer is done
    pub async fn next_page(&mut self) -> Option<Result<QueuedPage>> {
        self.rx.recv().await
    }

    /// Poll for the next page in fetch order
    pub fn poll_next_page(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<QueuedPage>>> {
        self.rx.poll_recv(cx)
    }

    /// Maximum pages in flight or unconsumed
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held by fetches, queued pages, or the page being drained
    pub fn in_use(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Stop accepting pages and drop every queued one, closing its body.
    /// Returns how many pages were discarded.
    pub fn close(&mut self) -> usize {
        self.slots.close();
        self.rx.close();
        let mut discarded = 0;
        while let Ok(item) = self.rx.try_recv() {
            if item.is_ok() {
                discarded += 1;
            }
        }
        discarded
    }
}
