//! Domain layer - Records, caller context and port definitions
//!
//! This module defines the core traits (ports) that adapters implement,
//! following hexagonal architecture principles.

pub mod context;
pub mod models;
pub mod ports;

pub use context::RequestContext;
pub use models::*;
pub use ports::*;
