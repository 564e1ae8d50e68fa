//! How long a decorator keeps its limiter.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::limiter::Limiter;
use super::rate::Rate;

/// Lifetime of the limiter behind a throttled stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterScope {
    /// A fresh limiter for every read or write call. Each call gets the full
    /// burst allowance, so the cap holds within a call but not across calls.
    #[default]
    PerOperation,
    /// One limiter for the lifetime of the stream. The cap holds across
    /// calls; only the first call gets the burst.
    Shared,
}

/// Owns the limiter of one throttled stream according to its scope.
#[derive(Debug)]
pub struct LimiterSlot {
    rate: Rate,
    scope: LimiterScope,
    limiter: Option<Limiter>,
}

impl LimiterSlot {
    pub fn new(rate: Rate, scope: LimiterScope) -> Self {
        Self {
            rate,
            scope,
            limiter: None,
        }
    }

    /// The limiter for the operation in progress, started on first use.
    pub fn limiter(&mut self) -> &mut Limiter {
        let rate = self.rate;
        self.limiter.get_or_insert_with(|| Limiter::start(rate))
    }

    /// Mark the operation in progress as complete.
    ///
    /// Under [`LimiterScope::PerOperation`] this stops the limiter, so the
    /// next operation starts over with a full burst.
    pub fn finish(&mut self) {
        if self.scope != LimiterScope::PerOperation {
            return;
        }
        if let Some(limiter) = self.limiter.take() {
            // Shutdown is signalled; nothing needs to wait for the task itself.
            drop(limiter.stop());
            trace!(rate = %self.rate, "Per-operation limiter released");
        }
    }

    /// Whether a limiter is currently held.
    pub fn is_pacing(&self) -> bool {
        self.limiter.is_some()
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    pub fn scope(&self) -> LimiterScope {
        self.scope
    }
}
