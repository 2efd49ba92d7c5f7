//! Streaming merge of paginated JSON arrays
//!
//! A paginated response arrives as the raw concatenation of several
//! independent JSON array documents, e.g. `[{..},{..}][{..}]`. That is not
//! one valid document, so it cannot be decoded in one go. The merger
//! scans the bytes incrementally, decodes every array element on its own,
//! and appends it to a caller-owned [`MergeTarget`]. Page boundaries
//! disappear; element order is preserved. Values outside any array are
//! skipped, though arrays nested in them are still merged.

mod scanner;

use crate::error::{Error, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use scanner::ArrayScanner;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;

/// An ordered collection that decoded elements are appended to
pub trait MergeTarget {
    /// Element type decoded from each array entry
    type Item: DeserializeOwned;

    /// Append one element at the end
    fn append(&mut self, item: Self::Item);
}

impl<T: DeserializeOwned> MergeTarget for Vec<T> {
    type Item = T;

    fn append(&mut self, item: T) {
        self.push(item);
    }
}

impl<T: DeserializeOwned> MergeTarget for VecDeque<T> {
    type Item = T;

    fn append(&mut self, item: T) {
        self.push_back(item);
    }
}

/// Incremental merger writing into `target`
///
/// Feed it chunks with [`StreamMerger::feed`] and call
/// [`StreamMerger::finish`] at end of input. After any error the target
/// holds a partial result and must be discarded.
#[derive(Debug)]
pub struct StreamMerger<'a, C: MergeTarget> {
    target: &'a mut C,
    scanner: ArrayScanner,
    appended: usize,
}

impl<'a, C: MergeTarget> StreamMerger<'a, C> {
    /// Create a merger appending to `target`
    pub fn new(target: &'a mut C) -> Self {
        Self {
            target,
            scanner: ArrayScanner::new(),
            appended: 0,
        }
    }

    /// Scan one chunk of input, appending every element it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        let target = &mut *self.target;
        let appended = &mut self.appended;
        self.scanner.feed(chunk, |raw| {
            let item = serde_json::from_slice::<C::Item>(raw).map_err(|e| {
                Error::decode(format!("element {}: {e}", *appended + 1))
            })?;
            target.append(item);
            *appended += 1;
            Ok(())
        })
    }

    /// Elements appended so far
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Array documents seen so far (one per page)
    pub fn arrays(&self) -> usize {
        self.scanner.arrays()
    }

    /// Finish the merge; fails if input ended inside an array.
    /// Returns the number of elements appended.
    pub fn finish(self) -> Result<usize> {
        self.scanner.finish()?;
        Ok(self.appended)
    }
}

/// Merge every element of every array in `stream` into `target`.
///
/// Returns the number of elements appended. The first error, from the
/// stream or from decoding, aborts the merge and drops the stream.
pub async fn merge<S, C>(stream: S, target: &mut C) -> Result<usize>
where
    S: Stream<Item = Result<Bytes>>,
    C: MergeTarget,
{
    let mut stream = std::pin::pin!(stream);
    let mut merger = StreamMerger::new(target);
    while let Some(chunk) = stream.next().await {
        merger.feed(&chunk?)?;
    }
    merger.finish()
}

/// Decode the whole of `stream` as a single JSON document.
///
/// Only valid for unpaginated responses: the concatenation of several
/// pages is not one document.
pub async fn merge_document<S, T>(stream: S) -> Result<T>
where
    S: Stream<Item = Result<Bytes>>,
    T: DeserializeOwned,
{
    let mut stream = std::pin::pin!(stream);
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }
    Ok(serde_json::from_slice(&body)?)
}
