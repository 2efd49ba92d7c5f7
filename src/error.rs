//! Error types for pagerelay
//!
//! This module defines the error hierarchy for the whole crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use reqwest::{Method, StatusCode};
use thiserror::Error;

/// The main error type for pagerelay
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Network Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url}: {status}{}", api_message(.message))]
    HttpStatus {
        method: Method,
        url: String,
        status: StatusCode,
        message: Option<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Pagination Errors
    // ============================================================================
    #[error("Pagination error: {message}")]
    Pagination { message: String },

    // ============================================================================
    // Decode Errors
    // ============================================================================
    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a pagination error
    pub fn pagination(message: impl Into<String>) -> Self {
        Self::Pagination {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(
        method: Method,
        url: impl Into<String>,
        status: StatusCode,
        message: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            method,
            url: url.into(),
            status,
            message,
        }
    }

    /// Create the error reported when a transfer stalls past its idle window
    pub fn idle_timeout(timeout: std::time::Duration) -> Self {
        Self::Io(idle_timeout_io(timeout))
    }

    /// Status code carried by an HTTP status error
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            Error::Http(e) => e.status(),
            _ => None,
        }
    }

    /// Check if this error came from the network layer (dial, transport, idle timeout)
    pub fn is_network(&self) -> bool {
        match self {
            Error::Http(e) => !e.is_decode() && !e.is_status(),
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Check if this error is a timeout, whether from the transport or a stalled transfer
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout(),
            Error::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Check if this error is a decode failure
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. } | Error::JsonParse(_))
    }
}

fn api_message(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(" ({m})"))
        .unwrap_or_default()
}

/// The I/O error watchdogs raise when no progress was made within `timeout`
pub(crate) fn idle_timeout_io(timeout: std::time::Duration) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("no activity for {}s, connection closed", timeout.as_secs_f64()),
    )
}

/// Result type alias for pagerelay
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
