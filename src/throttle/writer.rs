//! Rate-limited writes.

use std::io;
use std::mem;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::future::poll_fn;
use pin_project::pin_project;
use tokio::io::AsyncWrite;
use tracing::{debug, trace};

use crate::error::TransferError;
use crate::ratelimit::{LimiterScope, LimiterSlot, Rate};

/// Wraps an [`AsyncWrite`] so bytes go into it no faster than a [`Rate`].
///
/// Every write call is one relay operation: the caller's buffer is written
/// one byte at a time, each byte gated by the limiter, until it is all
/// written or the inner sink fails. A write call either takes the whole
/// buffer or stops at the first error.
///
/// As with [`ThrottledReader`](crate::ThrottledReader), the [`AsyncWrite`]
/// implementation returns a partial count first and the error on the next
/// call; [`write_throttled`](ThrottledWriter::write_throttled) reports both
/// at once. `flush` and `shutdown` are not paced.
///
/// [`AsyncWrite::poll_write`] never returns `Pending` once bytes have gone
/// into the sink: it returns the short count instead and the pacing carries
/// on into the next call. Its limiter is released when a call writes its
/// whole buffer or fails, or on shutdown.
#[pin_project]
#[derive(Debug)]
pub struct ThrottledWriter<W> {
    #[pin]
    inner: W,
    slot: LimiterSlot,
    /// Bytes of the current buffer already written by the operation in progress.
    written: usize,
    /// The next inner write already holds an admission.
    admitted: bool,
    /// Failure held back so that a partial write could be returned first.
    deferred: Option<io::Error>,
}

impl<W> ThrottledWriter<W> {
    /// Throttle `inner` to `rate`, with a fresh limiter for every write call.
    pub fn new(inner: W, rate: Rate) -> Self {
        Self::with_scope(inner, rate, LimiterScope::PerOperation)
    }

    /// Throttle `inner` to `rate`, keeping limiters for `scope`.
    pub fn with_scope(inner: W, rate: Rate, scope: LimiterScope) -> Self {
        Self {
            inner,
            slot: LimiterSlot::new(rate, scope),
            written: 0,
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
    pub fn is_pacing(&self) -> bool {
        self.slot.is_pacing()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn get_pin_mut(self: Pin<&mut Self>) -> Pin<&mut W> {
        self.project().inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Close out a write that was dropped before it returned.
    ///
    /// The bytes already written are gone; the next write starts at the
    /// beginning of its own buffer.
    fn abandon(&mut self) {
        self.written = 0;
        self.slot.finish();
        if !self.slot.is_pacing() {
            self.admitted = false;
        }
    }
}

/// Closes out the operation of a `write_throttled` future, however it ends.
struct OperationGuard<'a, W>(&'a mut ThrottledWriter<W>);

impl<W> Drop for OperationGuard<'_, W> {
    fn drop(&mut self) {
        self.0.abandon();
    }
}

impl<W: AsyncWrite> ThrottledWriter<W> {
    /// Relay the unwritten part of `src` into the sink.
    fn poll_relay(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        src: &[u8],
    ) -> Poll<Option<io::Error>> {
        let mut this = self.project();

        while *this.written < src.len() {
            if !*this.admitted {
                ready!(this.slot.limiter().poll_wait(cx));
                *this.admitted = true;
            }

            let at = *this.written;
            let result = ready!(this.inner.as_mut().poll_write(cx, &src[at..at + 1]));
            *this.admitted = false;

            match result {
                Ok(0) => {
                    return Poll::Ready(Some(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "inner sink accepted no bytes",
                    )))
                }
                Ok(_) => *this.written += 1,
                Err(e) => return Poll::Ready(Some(e)),
            }
        }

        Poll::Ready(None)
    }

    /// Poll one relay operation from `src`.
    ///
    /// Returns `src.len()`, or the inner error together with the number of
    /// bytes written before it. Bytes written before a `Pending` count
    /// against `src`, so poll again with the same buffer.
    pub fn poll_write_throttled(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        src: &[u8],
    ) -> Poll<Result<usize, TransferError>> {
        if let Some(err) = self.as_mut().project().deferred.take() {
            return Poll::Ready(Err(TransferError::new(0, err)));
        }
        if src.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let error = ready!(self.as_mut().poll_relay(cx, src));
        let this = self.project();
        this.slot.finish();

        let n = mem::take(this.written).min(src.len());

        match error {
            Some(err) => {
                debug!(transferred = n, error = %err, "Throttled write failed");
                Poll::Ready(Err(TransferError::new(n, err)))
            }
            None => {
                trace!(transferred = n, "Throttled write complete");
                Poll::Ready(Ok(n))
            }
        }
    }

    /// Surface a held-back error, if any.
    fn take_deferred(self: Pin<&mut Self>) -> io::Result<()> {
        match self.project().deferred.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<W: AsyncWrite + Unpin> ThrottledWriter<W> {
    /// Write all of `buf` at the configured rate.
    ///
    /// Not cancel safe: if the future is dropped, a prefix of `buf` may
    /// already be in the sink. The next write starts afresh either way.
    pub async fn write_throttled(&mut self, buf: &[u8]) -> Result<usize, TransferError> {
        let mut guard = OperationGuard(self);
        let result = poll_fn(|cx| Pin::new(&mut *guard.0).poll_write_throttled(cx, buf)).await;
        drop(guard);
        result
    }
}

impl<W: AsyncWrite> AsyncWrite for ThrottledWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let result = match self.as_mut().poll_write_throttled(cx, buf) {
            Poll::Ready(result) => result,
            Poll::Pending => {
                let written = mem::take(self.project().written);
                if written == 0 {
                    return Poll::Pending;
                }
                trace!(transferred = written, requested = buf.len(), "Short throttled write");
                return Poll::Ready(Ok(written));
            }
        };

        match result {
            Ok(n) => Poll::Ready(Ok(n)),
            Err(TransferError {
                transferred: 0,
                source,
            }) => Poll::Ready(Err(source)),
            Err(TransferError {
                transferred,
                source,
            }) => {
                *self.project().deferred = Some(source);
                Poll::Ready(Ok(transferred))
            }
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.as_mut().take_deferred()?;
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.as_mut().take_deferred()?;
        let this = self.project();
        this.slot.finish();
        this.inner.poll_shutdown(cx)
    }
}
