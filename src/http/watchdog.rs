//! Inactivity timeouts for transfers
//!
//! An absolute request timeout cannot tell a large transfer from a stuck
//! one. The types here instead reset a deadline every time the transfer
//! makes progress, so a transfer fails only once it has been idle for the
//! whole window.
//!
//! - [`WatchdogConnection`] wraps a raw `AsyncRead + AsyncWrite` connection.
//!   It is a standalone building block for transports that own their
//!   sockets; [`crate::Client`] does not dial through it, because reqwest
//!   keeps its connections private.
//! - [`WatchdogStream`] wraps a body byte stream (downloads).
//! - [`Watchdog`] is a shared activity clock, touched by an upload body
//!   and raced against the request future.
//!
//! The client guards response headers with a timeout of one idle window,
//! every response body with a [`WatchdogStream`], and upload bodies with a
//! [`Watchdog`].
//!
//! Timeouts surface as ordinary `io::ErrorKind::TimedOut` errors.

use crate::error::{idle_timeout_io, Error};
use futures::Stream;
use pin_project_lite::pin_project;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep, sleep_until, Instant, Sleep};

// ============================================================================
// WatchdogConnection
// ============================================================================

pin_project! {
    /// A connection that is closed when a read or write waits longer than `timeout`.
    ///
    /// Each direction has its own deadline, reset when a new read (or
    /// write) call begins. Once a deadline fires the connection is dead:
    /// the blocked call and every later call fail with `TimedOut`.
    ///
    /// `Unpin` whenever `S` is, so it can stand in for the raw connection.
    /// Must be created inside a tokio runtime.
    #[derive(Debug)]
    pub struct WatchdogConnection<S> {
        #[pin]
        inner: S,
        read_deadline: Pin<Box<Sleep>>,
        write_deadline: Pin<Box<Sleep>>,
        read_waiting: bool,
        write_waiting: bool,
        timed_out: bool,
        timeout: Duration,
    }
}

impl<S> WatchdogConnection<S> {
    /// Wrap `inner` with an idle window of `timeout`
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner,
            read_deadline: Box::pin(sleep(timeout)),
            write_deadline: Box::pin(sleep(timeout)),
            read_waiting: false,
            write_waiting: false,
            timed_out: false,
            timeout,
        }
    }

    /// The idle window
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a deadline has fired
    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    /// Borrow the wrapped connection
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Unwrap the connection
    pub fn into_inner(self) -> S {
        self.inner
    }
}

/// Run one poll of an I/O operation under `deadline`.
fn guarded<T>(
    cx: &mut Context<'_>,
    mut deadline: Pin<&mut Sleep>,
    waiting: &mut bool,
    timed_out: &mut bool,
    timeout: Duration,
    op: impl FnOnce(&mut Context<'_>) -> Poll<io::Result<T>>,
) -> Poll<io::Result<T>> {
    if *timed_out {
        return Poll::Ready(Err(idle_timeout_io(timeout)));
    }
    if !*waiting {
        deadline.as_mut().reset(Instant::now() + timeout);
        *waiting = true;
    }
    match op(cx) {
        Poll::Ready(res) => {
            *waiting = false;
            Poll::Ready(res)
        }
        Poll::Pending => {
            if deadline.poll(cx).is_ready() {
                *waiting = false;
                *timed_out = true;
                tracing::debug!(?timeout, "connection idle, closing");
                return Poll::Ready(Err(idle_timeout_io(timeout)));
            }
            Poll::Pending
        }
    }
}

impl<S: AsyncRead> AsyncRead for WatchdogConnection<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let inner = this.inner;
        guarded(
            cx,
            this.read_deadline.as_mut(),
            this.read_waiting,
            this.timed_out,
            *this.timeout,
            |cx| inner.poll_read(cx, buf),
        )
    }
}

impl<S: AsyncWrite> AsyncWrite for WatchdogConnection<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let inner = this.inner;
        guarded(
            cx,
            this.write_deadline.as_mut(),
            this.write_waiting,
            this.timed_out,
            *this.timeout,
            |cx| inner.poll_write(cx, buf),
        )
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        let inner = this.inner;
        guarded(
            cx,
            this.write_deadline.as_mut(),
            this.write_waiting,
            this.timed_out,
            *this.timeout,
            |cx| inner.poll_flush(cx),
        )
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

// ============================================================================
// WatchdogStream
// ============================================================================

pin_project! {
    /// A fallible stream that yields an idle-timeout error when the next
    /// item takes longer than `timeout` to arrive. The stream ends after
    /// the timeout error.
    #[derive(Debug)]
    pub struct WatchdogStream<S> {
        #[pin]
        inner: S,
        deadline: Pin<Box<Sleep>>,
        waiting: bool,
        done: bool,
        timeout: Duration,
    }
}

impl<S> WatchdogStream<S> {
    /// Wrap `inner` with an idle window of `timeout`
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner,
            deadline: Box::pin(sleep(timeout)),
            waiting: false,
            done: false,
            timeout,
        }
    }
}

impl<S, T, E> Stream for WatchdogStream<S>
where
    S: Stream<Item = std::result::Result<T, E>>,
    E: Into<Error>,
{
    type Item = crate::Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        if !*this.waiting {
            let next = Instant::now() + *this.timeout;
            this.deadline.as_mut().reset(next);
            *this.waiting = true;
        }
        match this.inner.poll_next(cx) {
            Poll::Ready(item) => {
                *this.waiting = false;
                if item.is_none() {
                    *this.done = true;
                }
                Poll::Ready(item.map(|r| r.map_err(Into::into)))
            }
            Poll::Pending => {
                if this.deadline.as_mut().poll(cx).is_ready() {
                    *this.done = true;
                    tracing::debug!(timeout = ?*this.timeout, "body stream idle, aborting");
                    return Poll::Ready(Some(Err(Error::idle_timeout(*this.timeout))));
                }
                Poll::Pending
            }
        }
    }
}

// ============================================================================
// Watchdog
// ============================================================================

/// Shared activity clock for transfers whose progress is observed from
/// outside the connection (e.g. an upload body pulled by the transport).
#[derive(Debug, Clone)]
pub struct Watchdog {
    state: Arc<WatchdogState>,
}

#[derive(Debug)]
struct WatchdogState {
    timeout: Duration,
    last_activity: Mutex<Instant>,
}

impl Watchdog {
    /// Start a watchdog; the idle window begins now
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Arc::new(WatchdogState {
                timeout,
                last_activity: Mutex::new(Instant::now()),
            }),
        }
    }

    /// The idle window
    pub fn timeout(&self) -> Duration {
        self.state.timeout
    }

    /// Record progress, pushing the deadline forward
    pub fn touch(&self) {
        *self
            .state
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn deadline(&self) -> Instant {
        let last = *self
            .state
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        last + self.state.timeout
    }

    /// Resolve once no activity has been recorded for the whole window
    pub async fn expired(&self) {
        loop {
            let deadline = self.deadline();
            if Instant::now() >= deadline {
                return;
            }
            sleep_until(deadline).await;
        }
    }

    /// Touch the watchdog every time `stream` yields an item
    pub fn watch<S: Stream>(&self, stream: S) -> impl Stream<Item = S::Item> {
        use futures::StreamExt;

        let watchdog = self.clone();
        stream.inspect(move |_| watchdog.touch())
    }
}
