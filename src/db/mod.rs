//! Status Ledger adapters
//!
//! The reference ledger keeps every record in memory. It backs standalone
//! deployments and the test suite.

pub mod memory;

pub use memory::MemoryLedger;

/// Topic under which share services register
pub const DEFAULT_SHARE_TOPIC: &str = "share";
