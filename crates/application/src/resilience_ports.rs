mod bloom;
mod cache;
mod clock;
mod lock;
mod metrics;
mod sliding_window;

pub use bloom::BloomBitStore;
pub use cache::SharedCacheStore;
pub use clock::{Clock, SystemClock};
pub use lock::LockCoordinator;
pub use metrics::{NoopMetrics, ResilienceMetrics};
pub use sliding_window::SlidingWindowStore;
