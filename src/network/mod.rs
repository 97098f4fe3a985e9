//! Network allocation
//!
//! Hands out addresses to share networks and records them in the status
//! ledger.

pub mod allocator;

pub use allocator::{CidrAllocator, NetworkConfig};
