//! The admission gate that paces byte transfers.
//!
//! A [`Limiter`] is a bounded queue with capacity `count` plus a background
//! task that empties one slot every `interval`. Each admission occupies a
//! slot, so the first `count` admissions go straight through and the rest
//! wait for the pacing task to make room. Occupancy counts capacity already
//! used rather than tokens left, but the observable pacing is the usual token
//! bucket: a burst of `count`, then one admission per `interval`.

use std::task::{ready, Context, Poll};
use std::time::Duration;

use futures::future::{poll_fn, BoxFuture};
use futures::FutureExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::rate::Rate;

/// Admits byte transfers at no more than the configured [`Rate`].
///
/// Must be created inside a tokio runtime, since it spawns its pacing task.
/// The task ends when the limiter is [stopped](Limiter::stop) or dropped.
pub struct Limiter {
    rate: Rate,
    /// Inserting into this queue is an admission.
    slots: mpsc::Sender<()>,
    /// An admission that returned `Pending` and must be resumed, not restarted.
    admission: Option<BoxFuture<'static, ()>>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Limiter {
    /// Create a limiter with an empty queue and start its pacing task.
    pub fn start(rate: Rate) -> Self {
        let (slots, occupied) = mpsc::channel(rate.count() as usize);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(pace(occupied, rate.interval(), shutdown_rx));

        debug!(rate = %rate, interval = ?rate.interval(), "Limiter started");

        Self {
            rate,
            slots,
            admission: None,
            shutdown,
            task,
        }
    }

    /// Wait until a slot is free, then take it.
    ///
    /// Call once per byte. Never fails: if the pacing task is gone the queue
    /// is closed and the admission is granted immediately.
    pub async fn wait(&mut self) {
        poll_fn(|cx| self.poll_wait(cx)).await
    }

    /// Poll-based [`wait`](Limiter::wait).
    ///
    /// After `Pending`, the next poll resumes the same admission attempt, so
    /// an abandoned `wait` never costs a second slot. A free slot is taken
    /// in place; only a full queue parks an admission future.
    pub fn poll_wait(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if self.admission.is_none() {
            match self.slots.try_send(()) {
                Ok(()) | Err(TrySendError::Closed(())) => return Poll::Ready(()),
                Err(TrySendError::Full(())) => {
                    self.admission = Some(admit(self.slots.clone()));
                }
            }
        }
        if let Some(admission) = self.admission.as_mut() {
            ready!(admission.poll_unpin(cx));
        }
        self.admission = None;
        Poll::Ready(())
    }

    /// The rate this limiter paces to.
    pub fn rate(&self) -> Rate {
        self.rate
    }

    /// Whether the pacing task is still alive.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the pacing task to exit.
    ///
    /// Returns the task's handle; awaiting it confirms the task is gone.
    /// Dropping the limiter instead has the same effect without the handle.
    pub fn stop(self) -> JoinHandle<()> {
        let Limiter {
            rate,
            shutdown,
            task,
            ..
        } = self;

        // The task may already be gone, in which case there is nobody to tell.
        let _ = shutdown.send(());
        debug!(rate = %rate, "Limiter stopped");
        task
    }
}

impl std::fmt::Debug for Limiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter")
            .field("rate", &self.rate)
            .field("waiting", &self.admission.is_some())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Occupy one slot of the queue.
fn admit(slots: mpsc::Sender<()>) -> BoxFuture<'static, ()> {
    async move {
        if let Ok(permit) = slots.reserve_owned().await {
            permit.send(());
        }
    }
    .boxed()
}

/// Free one occupied slot every `interval` until shutdown.
///
/// Shutdown is checked first at both suspension points. A dropped sender
/// counts as shutdown.
async fn pace(
    mut occupied: mpsc::Receiver<()>,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(interval) => {}
        }

        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            slot = occupied.recv() => {
                if slot.is_none() {
                    break;
                }
            }
        }
    }

    trace!(interval = ?interval, "Pacing task exiting");
}
