//! Trickle - byte-rate throttling for async streams
//!
//! This crate wraps tokio readers and writers so that bytes flow through
//! them no faster than a configured [`Rate`]. Each byte is admitted by a
//! [`Limiter`]: a bounded queue drained by a background pacing task, which
//! allows an initial burst of `count` bytes and then one byte per
//! `window / count`.
//!
//! ```no_run
//! use tokio::io::AsyncWriteExt;
//! use trickle::{Rate, ThrottledWriter};
//!
//! # async fn upload(socket: tokio::net::TcpStream) -> std::io::Result<()> {
//! let rate = Rate::per_second(64 * 1024).expect("non-zero rate");
//! let mut socket = ThrottledWriter::new(socket, rate);
//! socket.write_all(b"payload").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod throttle;

pub use config::{DirectionConfig, ThrottleConfig};
pub use error::{Result, ThrottleError, TransferError};
pub use ratelimit::{Limiter, LimiterScope, Rate, TimeUnit};
pub use throttle::{ThrottledReader, ThrottledWriter};

#[cfg(test)]
mod test_util;
