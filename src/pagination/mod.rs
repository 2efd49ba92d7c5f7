//! Pagination module
//!
//! Follows `Link: <...>; rel="next"` chains (RFC 5988).
//!
//! # Overview
//!
//! ```text
//! PageSource ──fetch──▶ PageFetcher ──▶ ResponseQueue (bounded FIFO) ──▶ PageStream ──▶ merger
//!                           ▲                                                │
//!                           └──────────── slot released per drained page ────┘
//! ```
//!
//! The fetcher runs on its own task and never has more than the queue
//! capacity (default 5) pages in flight or unconsumed.

mod fetcher;
mod link;
mod queue;
mod types;

pub use fetcher::{PageFetcher, PageStream};
pub use link::{PaginationLinks, REL_NEXT};
pub use queue::{response_queue, QueueSender, QueueSlot, QueuedPage, ResponseQueue};
pub use types::{BodyStream, Page, PageSource};

#[cfg(test)]
mod tests;
