//! Rate-limited reads.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::future::poll_fn;
use pin_project::pin_project;
use tokio::io::{AsyncRead, ReadBuf};
use tracing::{debug, trace};

use crate::error::TransferError;
use crate::ratelimit::{LimiterScope, LimiterSlot, Rate};

/// Wraps an [`AsyncRead`] so bytes come off it no faster than a [`Rate`].
///
/// Every read call is one relay operation: the inner source is read one byte
/// at a time, each byte gated by the limiter, until the caller's buffer is
/// full or the source reaches end-of-stream. End-of-stream is a short read,
/// not an error.
///
/// The [`AsyncRead`] implementation can only return bytes or an error, not
/// both. When the inner source fails after some bytes were copied, the call
/// returns those bytes and the next call returns the error.
/// [`read_throttled`](ThrottledReader::read_throttled) reports both at once.
///
/// An operation abandoned mid-way (its future dropped) keeps the bytes it
/// already relayed; the next read returns them first. Its limiter is
/// released with it under [`LimiterScope::PerOperation`].
#[pin_project]
#[derive(Debug)]
pub struct ThrottledReader<R> {
    #[pin]
    inner: R,
    slot: LimiterSlot,
    /// Bytes relayed by the operation in progress.
    staged: Vec<u8>,
    /// The next inner read already holds an admission.
    admitted: bool,
    /// Failure held back so that a partial read could be returned first.
    deferred: Option<io::Error>,
}

impl<R> ThrottledReader<R> {
    /// Throttle `inner` to `rate`, with a fresh limiter for every read call.
    pub fn new(inner: R, rate: Rate) -> Self {
        Self::with_scope(inner, rate, LimiterScope::PerOperation)
    }

    /// Throttle `inner` to `rate`, keeping limiters for `scope`.
    pub fn with_scope(inner: R, rate: Rate, scope: LimiterScope) -> Self {
        Self {
            inner,
            slot: LimiterSlot::new(rate, scope),
            staged: Vec::new(),
            admitted: false,
            deferred: None,
        }
    }

    pub fn rate(&self) -> Rate {
        self.slot.rate()
    }

    pub fn scope(&self) -> LimiterScope {
        self.slot.scope()
    }

    /// Whether a limiter (and its pacing task) is currently alive.
    ///
    /// Between calls this is `false` under [`LimiterScope::PerOperation`].
    pub fn is_pacing(&self) -> bool {
        self.slot.is_pacing()
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn get_pin_mut(self: Pin<&mut Self>) -> Pin<&mut R> {
        self.project().inner
    }

    /// Unwrap the inner source. Bytes staged by an abandoned read are lost.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Close out a read that was dropped before it returned.
    fn abandon(&mut self) {
        self.slot.finish();
        if !self.slot.is_pacing() {
            self.admitted = false;
        }
    }
}

/// Closes out the operation of a `read_throttled` future, however it ends.
struct OperationGuard<'a, R>(&'a mut ThrottledReader<R>);

impl<R> Drop for OperationGuard<'_, R> {
    fn drop(&mut self) {
        self.0.abandon();
    }
}

impl<R: AsyncRead> ThrottledReader<R> {
    /// Relay bytes into `staged` until it holds `want` or the source ends.
    fn poll_relay(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        want: usize,
    ) -> Poll<Option<io::Error>> {
        let mut this = self.project();

        while this.staged.len() < want {
            if !*this.admitted {
                ready!(this.slot.limiter().poll_wait(cx));
                *this.admitted = true;
            }

            let mut byte = [0u8; 1];
            let mut one = ReadBuf::new(&mut byte);
            let result = ready!(this.inner.as_mut().poll_read(cx, &mut one));
            *this.admitted = false;

            match result {
                Ok(()) => match one.filled().first() {
                    Some(&b) => this.staged.push(b),
                    None => break,
                },
                Err(e) => return Poll::Ready(Some(e)),
            }
        }

        Poll::Ready(None)
    }

    /// Poll one relay operation into `dst`.
    ///
    /// Returns the number of bytes copied, or the inner error together with
    /// the number copied before it.
    pub fn poll_read_throttled(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        dst: &mut [u8],
    ) -> Poll<Result<usize, TransferError>> {
        if let Some(err) = self.as_mut().project().deferred.take() {
            return Poll::Ready(Err(TransferError::new(0, err)));
        }
        if dst.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let error = ready!(self.as_mut().poll_relay(cx, dst.len()));
        let this = self.project();
        this.slot.finish();

        let n = this.staged.len().min(dst.len());
        dst[..n].copy_from_slice(&this.staged[..n]);
        this.staged.drain(..n);

        match error {
            Some(err) => {
                debug!(transferred = n, error = %err, "Throttled read failed");
                Poll::Ready(Err(TransferError::new(n, err)))
            }
            None => {
                trace!(transferred = n, requested = dst.len(), "Throttled read complete");
                Poll::Ready(Ok(n))
            }
        }
    }
}

impl<R: AsyncRead + Unpin> ThrottledReader<R> {
    /// Read into `buf` at the configured rate.
    ///
    /// On an inner error the bytes copied so far are in
    /// `buf[..err.transferred]`. Dropping the future keeps the bytes already
    /// relayed for the next read.
    pub async fn read_throttled(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        let mut guard = OperationGuard(self);
        let result = poll_fn(|cx| Pin::new(&mut *guard.0).poll_read_throttled(cx, buf)).await;
        drop(guard);
        result
    }
}

impl<R: AsyncRead> AsyncRead for ThrottledReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let dst = buf.initialize_unfilled();
        match ready!(self.as_mut().poll_read_throttled(cx, dst)) {
            Ok(n) => {
                buf.advance(n);
                Poll::Ready(Ok(()))
            }
            Err(TransferError {
                transferred: 0,
                source,
            }) => Poll::Ready(Err(source)),
            Err(TransferError {
                transferred,
                source,
            }) => {
                buf.advance(transferred);
                *self.project().deferred = Some(source);
                Poll::Ready(Ok(()))
            }
        }
    }
}
