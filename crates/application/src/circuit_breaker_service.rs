//! Named circuit breakers shared by every caller in the process.

mod registry;


pub use registry::CircuitBreakerRegistry;
