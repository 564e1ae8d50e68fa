//! Streams and setup shared by the unit tests.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

/// Send crate logs to the test harness. `RUST_LOG` overrides the default.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trickle=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Yields `data`, then fails every read with `message`.
pub(crate) struct FailingReader {
    data: Vec<u8>,
    pos: usize,
    message: &'static str,
}

impl FailingReader {
    pub(crate) fn new(data: &[u8], message: &'static str) -> Self {
        Self {
            data: data.to_vec(),
            pos: 0,
            message,
        }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.pos == self.data.len() {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, self.message)));
        }
        let start = self.pos;
        let n = buf.remaining().min(self.data.len() - start);
        buf.put_slice(&self.data[start..start + n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

/// Accepts `capacity` bytes, then fails every write with `message`.
pub(crate) struct FailingWriter {
    pub(crate) accepted: Vec<u8>,
    capacity: usize,
    message: &'static str,
}

impl FailingWriter {
    pub(crate) fn new(capacity: usize, message: &'static str) -> Self {
        Self {
            accepted: Vec::new(),
            capacity,
            message,
        }
    }
}

impl AsyncWrite for FailingWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let room = self.capacity - self.accepted.len();
        if room == 0 {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, self.message)));
        }
        let n = room.min(buf.len());
        self.accepted.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Records every byte written along with when it arrived.
#[derive(Default)]
pub(crate) struct RecordingWriter {
    pub(crate) bytes: Vec<u8>,
    pub(crate) times: Vec<Instant>,
}

impl AsyncWrite for RecordingWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let now = Instant::now();
        self.bytes.extend_from_slice(buf);
        self.times.extend(buf.iter().map(|_| now));
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// A sink that never takes anything.
pub(crate) struct FullWriter;

impl AsyncWrite for FullWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(0))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
