//! HTTP client module
//!
//! Provides the API client facade and the transport guards it relies on.
//!
//! # Features
//!
//! - **Pagination**: `Client::get` follows `Link` headers and merges pages
//! - **Idle Timeouts**: Watchdogs that fire on inactivity, not on total duration
//! - **Rate Limiting**: Optional token bucket pacing using governor
//! - **Authentication**: `token`/`Bearer` credentials in the `Authorization` header

mod client;
mod rate_limit;
mod watchdog;

pub use client::{redacted_url, Client, PAGE_SIZE_PARAM};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use watchdog::{Watchdog, WatchdogConnection, WatchdogStream};
