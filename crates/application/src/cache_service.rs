//! Two-tier stampede-safe cache.
//!
//! Reads go local tier, then shared tier. A miss is recomputed by exactly
//! one caller: an in-process gate serializes callers of this instance and a
//! distributed lock elects one instance across the cluster. Entries carry a
//! soft expiry, after which they are still served while a single background
//! refresh runs, and a jittered hard expiry after which they are never
//! served.

mod load_context;
mod local_tier;
mod options;
mod service;

#[cfg(test)]
mod tests;

pub use load_context::LoadContext;
pub use options::{CacheOptions, LockLossPolicy, StoreFailurePolicy};
pub use service::StampedeSafeCache;
