//! Share Manager
//!
//! Per-host lifecycle state machine and the tasks that drive it:
//! - [`ShareManager`]: share, snapshot, access rule and share network operations
//! - [`ShareWorker`]: ordered consumer of the host's dispatch queue
//! - [`PeriodicTasks`]: heartbeat, capability reports and reaping

pub mod periodic;
pub mod share_manager;
pub mod worker;

pub use periodic::{PeriodicConfig, PeriodicTasks};
pub use share_manager::{save_and_reraise, ManagerDeps, ShareManager};
pub use worker::ShareWorker;
