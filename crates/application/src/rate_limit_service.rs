//! Distributed sliding-window admission control.
//!
//! Every decision goes through the shared [`SlidingWindowStore`] so all
//! instances see one quota. When the store fails or answers too slowly the
//! service degrades to a per-instance token bucket sized from the same
//! policy, trading global accuracy for availability.
//!
//! [`SlidingWindowStore`]: crate::SlidingWindowStore

mod config;
mod service;
mod token_bucket;


pub use config::{DEFAULT_FALLBACK_MAX_WAIT, RateLimitOptions, RateLimitRules};
pub use service::RateLimitService;
