//! Share Control Plane
//!
//! Control plane of a networked file-share provisioning service: places new
//! shares on capable backend hosts and drives per-host backend drivers through
//! the share, snapshot, access rule and share network lifecycles.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              Share Scheduler                                │
//! │        least-loaded placement over live services + capability view          │
//! └──────────────────────────────────┬──────────────────────────────────────────┘
//!                                    │ CreateShare (Envelope)
//!                          ┌─────────┴─────────┐
//!                          │    Message Bus    │  one ordered queue per host
//!                          └─────────┬─────────┘
//!                                    │
//! ┌──────────────────────────────────┴──────────────────────────────────────────┐
//! │                         Share Manager (per host)                            │
//! │   shares · snapshots · access rules · share networks · init / reporting     │
//! ├──────────────┬──────────────┬──────────────────┬────────────────────────────┤
//! │ Status Ledger│ Quota Ledger │ Network Allocator│      Backend Driver        │
//! │  (memory)    │  (engine)    │     (CIDR)       │  (memory / GlusterFS)      │
//! └──────────────┴──────────────┴──────────────────┴────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`scheduler`]: host selection and dispatch of share creation
//! - [`manager`]: per-host lifecycle state machine, worker and periodic tasks
//! - [`domain`]: records, status machines and collaborator traits
//! - [`db`], [`quota`], [`network`]: in-process collaborators
//! - [`drivers`]: backend drivers
//! - [`rpc`]: dispatch messages and the in-process bus
//! - [`error`]: Error types and handling

pub mod config;
pub mod db;
pub mod domain;
pub mod drivers;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod network;
pub mod quota;
pub mod rpc;
pub mod scheduler;

// Re-export commonly used types
pub use config::ServiceConfig;

pub use db::MemoryLedger;

pub use domain::ports::{
    CapabilityPublisher, NetworkAllocator, QuotaDeltas, QuotaLedger, QuotaResource, Reservation,
    ShareDriver, ShareRpc, StatusLedger,
};
pub use domain::RequestContext;

pub use drivers::{DriverConfig, DriverFactory, GlusterfsDriver, MemoryDriver};

pub use error::{Error, ErrorAction, Result};

pub use manager::{ManagerDeps, PeriodicTasks, ShareManager, ShareWorker};

pub use metrics::ControlPlaneMetrics;

pub use network::CidrAllocator;

pub use quota::QuotaEngine;

pub use rpc::{Envelope, MessageBus, ShareMessage};

pub use scheduler::{HostStateRegistry, SchedulerConfig, SimpleScheduler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
