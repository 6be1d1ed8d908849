//! Rate limiting domain
//!
//! Subjects, fixed windows, counter state, the atomic store contract and
//! the store failure policy.

mod clock;
mod counter;
mod policy;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{
    CounterState, RateLimitCounter, RateLimitDecision, RateLimitKey, RateLimitSubject,
    RateLimitWindow,
};
pub use policy::FailurePolicy;
pub use store::RateLimitStore;
#[cfg(test)]
pub use store::MockRateLimitStore;
