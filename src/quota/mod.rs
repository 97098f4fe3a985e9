//! Quota accounting
//!
//! Two-phase usage accounting per project: reserve, then commit or roll back.

pub mod engine;

pub use engine::{QuotaConfig, QuotaEngine, ResourceUsage};
