//! Rate configuration and the admission gate.

mod limiter;
mod rate;
mod scope;

pub use limiter::Limiter;
pub use rate::{Rate, TimeUnit};
pub use scope::LimiterScope;
pub(crate) use scope::LimiterSlot;
