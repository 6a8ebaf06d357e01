//! Composition of every primitive behind one read path.

mod facade;
mod settings;


pub use facade::{GuardedRead, ReadOutcome, ResilienceCore};
pub use settings::{BloomSettings, CoordinationPorts, ResilienceSettings};
