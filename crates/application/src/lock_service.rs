//! Token-owned distributed locks with lease heartbeats.

mod heartbeat;
mod service;


pub use heartbeat::LeaseHeartbeat;
pub use service::DistributedLockService;
