//! Shared bloom filter used to reject keys known to be absent.

mod filter;


pub use filter::BloomPreFilter;
