// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::needless_pass_by_value)]

//! # pagerelay
//!
//! A streaming client for paginated REST APIs (GitHub v3 style).
//!
//! ## Features
//!
//! - **Transparent Pagination**: Follows `Link: <...>; rel="next"` chains
//! - **Streaming Merge**: Pages are decoded element by element into one collection
//! - **Backpressure**: At most 5 pages in flight or waiting at any time
//! - **Idle Timeouts**: Transfers die when they stall, not when they are large
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pagerelay::{Client, ClientConfig, Result};
//!
//! #[derive(serde::Deserialize)]
//! struct Release {
//!     id: u64,
//!     tag_name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::with_config(ClientConfig::from_env())?;
//!
//!     let mut releases: Vec<Release> = Vec::new();
//!     client.get("/repos/rust-lang/rust/releases", &mut releases).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Client::get(uri, target)                  │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//! ┌──────────────┬───────────────┴───────────┬───────────────────┐
//! │   Fetcher    │   ResponseQueue (cap 5)   │   StreamMerger    │
//! ├──────────────┼───────────────────────────┼───────────────────┤
//! │ Link header  │ FIFO, slot per page       │ token-level scan  │
//! │ rate limit   │ backpressure              │ append in order   │
//! └──────────────┴───────────────────────────┴───────────────────┘
//!                                │
//!                     Watchdog (idle timeout)
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Client configuration
pub mod config;

/// API client, rate limiting, and idle-timeout watchdogs
pub mod http;

/// Link-header pagination pipeline
pub mod pagination;

/// Streaming merge of concatenated JSON arrays
pub mod merge;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ClientConfig, Credential};
pub use error::{Error, Result};
pub use http::Client;
pub use merge::{merge, MergeTarget, StreamMerger};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
