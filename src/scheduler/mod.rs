//! Share Scheduler
//!
//! Picks the backend host for new shares and dispatches creation to it.
//!
//! - [`SimpleScheduler`]: least-loaded greedy placement over live share services
//! - [`HostStateRegistry`]: last capability report of every host

pub mod host_state;
pub mod simple;

pub use host_state::{HostState, HostStateRegistry};
pub use simple::{parse_availability_zone, SchedulerConfig, SimpleScheduler};
